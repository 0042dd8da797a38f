#[cfg(test)]
mod tests {
    use keel::{
        Cascade, Dialect, EntityDef, Error, FetchMode, JoinTable, KeyGeneration, PropertyDef,
        Registry, RegistryBuilder, RelationDef, RenderedSelect, RenderedSql, RenderedStatement,
        SqlRenderer, Value, parse_query,
    };

    fn registry() -> Registry {
        let user = EntityDef::new("User")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Username", Value::Varchar(None)))
            .relation(
                RelationDef::one_to_many("Orders", "Order")
                    .mapped_by("User")
                    .cascade(Cascade::PERSIST),
            );
        let order = EntityDef::new("Order")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("UserId", Value::Int64(None)))
            .property(PropertyDef::new("Total", Value::Decimal(None)).nullable())
            .relation(
                RelationDef::many_to_one("User", "User")
                    .fetch(FetchMode::Eager),
            );
        let customer = EntityDef::new("TestCustomer")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("IsActive", Value::Boolean(None)))
            .property(PropertyDef::new("Profile", Value::Int64(None)).nullable())
            .relation(RelationDef::one_to_one("Account", "Account"))
            .relation(
                RelationDef::many_to_many("Tags", "Tag")
                    .join_table(JoinTable::new("customer_tags", "customer_id", "tag_id")),
            );
        let account = EntityDef::new("Account")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Balance", Value::Decimal(None)));
        let tag = EntityDef::new("Tag")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Label", Value::Varchar(None)));
        let product = EntityDef::new("Product")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Name", Value::Varchar(None)))
            .property(PropertyDef::new("TenantId", Value::Varchar(None)))
            .tenant("TenantId");
        RegistryBuilder::new()
            .register(user)
            .register(order)
            .register(customer)
            .register(account)
            .register(tag)
            .register(product)
            .build()
            .expect("registry must validate")
    }

    fn render_select(registry: &Registry, dialect: Dialect, text: &str) -> RenderedSelect {
        let parsed = parse_query(text).expect("query must parse");
        match SqlRenderer::new(registry, dialect)
            .render(&parsed)
            .expect("query must render")
        {
            RenderedStatement::Select(select) => select,
            RenderedStatement::Modify(..) => panic!("expected a select"),
        }
    }

    fn render_modify(registry: &Registry, dialect: Dialect, text: &str) -> RenderedSql {
        let parsed = parse_query(text).expect("query must parse");
        match SqlRenderer::new(registry, dialect)
            .render(&parsed)
            .expect("query must render")
        {
            RenderedStatement::Modify(modify) => modify,
            RenderedStatement::Select(..) => panic!("expected an update or delete"),
        }
    }

    #[test]
    fn select_expands_bare_alias_on_postgres() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Postgres,
            "SELECT u FROM User u WHERE u.Username = :username",
        );
        assert_eq!(
            rendered.sql,
            r#"SELECT u.id AS "Id", u.username AS "Username" FROM users AS u WHERE (u.username = $1)"#
        );
        assert_eq!(rendered.parameters, vec!["username"]);
    }

    #[test]
    fn count_of_bare_alias_uses_the_key_column() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::SqlServer,
            "SELECT COUNT(c) FROM TestCustomer c",
        );
        assert_eq!(rendered.sql, "SELECT COUNT(c.id) FROM test_customers AS c");
        assert!(rendered.parameters.is_empty());
    }

    #[test]
    fn count_distinct_follows_the_same_rewrite() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::SqlServer,
            "SELECT COUNT(DISTINCT c) FROM TestCustomer c",
        );
        assert_eq!(
            rendered.sql,
            "SELECT COUNT(DISTINCT c.id) FROM test_customers AS c"
        );
    }

    #[test]
    fn update_elides_the_alias() {
        let registry = registry();
        let rendered = render_modify(
            &registry,
            Dialect::SqlServer,
            "UPDATE TestCustomer c SET c.IsActive = :active WHERE c.Id = :id",
        );
        assert_eq!(
            rendered.sql,
            "UPDATE test_customers SET is_active = @active WHERE (id = @id)"
        );
        assert_eq!(rendered.parameters, vec!["active", "id"]);
    }

    #[test]
    fn delete_renders_bare_columns() {
        let registry = registry();
        let rendered = render_modify(
            &registry,
            Dialect::Postgres,
            "DELETE FROM TestCustomer c WHERE c.IsActive = :active",
        );
        assert_eq!(
            rendered.sql,
            "DELETE FROM test_customers WHERE (is_active = $1)"
        );
    }

    #[test]
    fn alias_quoting_per_dialect() {
        let registry = registry();
        let query = "SELECT u FROM User u";
        let unquoted = render_select(&registry, Dialect::SqlServer, query);
        assert!(unquoted.sql.contains("u.id AS Id"));
        let default = render_select(&registry, Dialect::Generic, query);
        assert!(default.sql.contains("u.id AS Id"));
        let double = render_select(&registry, Dialect::Postgres, query);
        assert!(double.sql.contains(r#"u.id AS "Id""#));
        let sqlite = render_select(&registry, Dialect::Sqlite, query);
        assert!(sqlite.sql.contains(r#"u.id AS "Id""#));
        let backtick = render_select(&registry, Dialect::MySql, query);
        assert!(backtick.sql.contains("u.id AS `Id`"));
        let mariadb = render_select(&registry, Dialect::MariaDb, query);
        assert!(mariadb.sql.contains("u.id AS `Id`"));
    }

    #[test]
    fn placeholders_are_ordinal_only_where_the_dialect_wants_them() {
        let registry = registry();
        let query = "SELECT u FROM User u WHERE u.Username = :name OR u.Id = :id OR u.Username = :name";
        let postgres = render_select(&registry, Dialect::Postgres, query);
        assert!(postgres.sql.contains("u.username = $1"));
        assert!(postgres.sql.contains("u.id = $2"));
        // The repeated parameter reuses its ordinal.
        assert!(postgres.sql.matches("$1").count() == 2);
        assert_eq!(postgres.parameters, vec!["name", "id"]);
        let server = render_select(&registry, Dialect::SqlServer, query);
        assert!(server.sql.contains("u.username = @name"));
        assert!(server.sql.contains("u.id = @id"));
    }

    #[test]
    fn generation_is_deterministic() {
        let registry = registry();
        let query = "SELECT u, COUNT(u) FROM User u JOIN u.Orders o WHERE u.Id IN (1, 2, 3) GROUP BY u.Username HAVING COUNT(u) > 1 ORDER BY u.Username DESC";
        let first = render_select(&registry, Dialect::MySql, query);
        let second = render_select(&registry, Dialect::MySql, query);
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.parameters, second.parameters);
    }

    #[test]
    fn many_to_one_join_uses_the_foreign_key() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT o FROM Order o JOIN o.User u",
        );
        assert!(
            rendered
                .sql
                .contains("INNER JOIN users AS u ON o.user_id = u.id")
        );
    }

    #[test]
    fn one_to_many_join_walks_mapped_by() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT u FROM User u LEFT JOIN u.Orders o",
        );
        assert!(
            rendered
                .sql
                .contains("LEFT JOIN orders AS o ON u.id = o.user_id")
        );
        assert_eq!(rendered.joins.len(), 1);
        assert_eq!(rendered.joins[0].relation, "Orders");
    }

    #[test]
    fn one_to_one_owner_join() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT c FROM TestCustomer c JOIN c.Account a",
        );
        assert!(
            rendered
                .sql
                .contains("INNER JOIN accounts AS a ON c.account_id = a.id")
        );
    }

    #[test]
    fn many_to_many_join_goes_through_the_join_table() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT c FROM TestCustomer c JOIN c.Tags t",
        );
        assert!(
            rendered.sql.contains(
                "INNER JOIN customer_tags AS t_jt ON c.id = t_jt.customer_id \
                 INNER JOIN tags AS t ON t_jt.tag_id = t.id"
            )
        );
    }

    #[test]
    fn right_join_is_rejected_on_sqlite() {
        let registry = registry();
        let parsed = parse_query("SELECT u FROM User u RIGHT JOIN u.Orders o").unwrap();
        let result = SqlRenderer::new(&registry, Dialect::Sqlite).render(&parsed);
        assert!(matches!(result, Err(Error::Unsupported(..))));
        let result = SqlRenderer::new(&registry, Dialect::Postgres).render(&parsed);
        assert!(result.is_ok());
    }

    #[test]
    fn tenant_predicate_is_conjoined_to_selects() {
        let registry = registry();
        let parsed =
            parse_query("SELECT p FROM Product p WHERE p.Name LIKE :pattern").unwrap();
        let rendered = SqlRenderer::new(&registry, Dialect::SqlServer)
            .tenant(Some("acme-corp".to_string()))
            .render(&parsed);
        let RenderedStatement::Select(rendered) = rendered.unwrap() else {
            panic!("expected a select");
        };
        assert!(
            rendered
                .sql
                .ends_with("WHERE (p.name LIKE @pattern) AND p.tenant_id = @__tenant")
        );
        assert_eq!(rendered.parameters, vec!["pattern", "__tenant"]);
    }

    #[test]
    fn tenant_predicate_alone_still_creates_a_where() {
        let registry = registry();
        let parsed = parse_query("SELECT p FROM Product p").unwrap();
        let RenderedStatement::Select(rendered) = SqlRenderer::new(&registry, Dialect::Postgres)
            .tenant(Some("acme-corp".to_string()))
            .render(&parsed)
            .unwrap()
        else {
            panic!("expected a select");
        };
        assert!(rendered.sql.ends_with("WHERE p.tenant_id = $1"));
        assert_eq!(rendered.parameters, vec!["__tenant"]);
    }

    #[test]
    fn tenant_predicate_applies_to_update_and_delete() {
        let registry = registry();
        let update = parse_query("UPDATE Product p SET p.Name = :name WHERE p.Id = :id").unwrap();
        let RenderedStatement::Modify(update) = SqlRenderer::new(&registry, Dialect::SqlServer)
            .tenant(Some("acme-corp".to_string()))
            .render(&update)
            .unwrap()
        else {
            panic!("expected a modify");
        };
        assert_eq!(
            update.sql,
            "UPDATE products SET name = @name WHERE (id = @id) AND tenant_id = @__tenant"
        );
        let delete = parse_query("DELETE FROM Product p WHERE p.Id = :id").unwrap();
        let RenderedStatement::Modify(delete) = SqlRenderer::new(&registry, Dialect::SqlServer)
            .tenant(Some("acme-corp".to_string()))
            .render(&delete)
            .unwrap()
        else {
            panic!("expected a modify");
        };
        assert_eq!(
            delete.sql,
            "DELETE FROM products WHERE (id = @id) AND tenant_id = @__tenant"
        );
    }

    #[test]
    fn delete_without_tenant_context_bypasses_the_filter() {
        let registry = registry();
        let parsed = parse_query("DELETE FROM Product p WHERE p.Id = :id").unwrap();
        let RenderedStatement::Modify(rendered) = SqlRenderer::new(&registry, Dialect::SqlServer)
            .render(&parsed)
            .unwrap()
        else {
            panic!("expected a modify");
        };
        assert_eq!(rendered.sql, "DELETE FROM products WHERE (id = @id)");
    }

    #[test]
    fn projection_shapes_describe_the_row_layout() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT u, o, COUNT(o) Total FROM User u JOIN u.Orders o",
        );
        assert_eq!(rendered.shapes.len(), 3);
        assert_eq!(rendered.shapes[0].width(), 2);
        assert_eq!(rendered.shapes[1].width(), 3);
        assert_eq!(rendered.shapes[2].width(), 1);
        assert_eq!(rendered.root_alias, "u");
        assert_eq!(rendered.root_entity, "User");
    }

    #[test]
    fn unknown_names_surface_as_typed_errors() {
        let registry = registry();
        let renderer = SqlRenderer::new(&registry, Dialect::Generic);
        let missing_entity = parse_query("SELECT g FROM Ghost g").unwrap();
        assert!(matches!(
            renderer.render(&missing_entity),
            Err(Error::UnknownEntity(..))
        ));
        let missing_property = parse_query("SELECT u FROM User u WHERE u.Missing = 1").unwrap();
        assert!(matches!(
            renderer.render(&missing_property),
            Err(Error::UnknownProperty { .. })
        ));
        let missing_alias = parse_query("SELECT u FROM User u WHERE x.Id = 1").unwrap();
        assert!(matches!(
            renderer.render(&missing_alias),
            Err(Error::UnknownAlias(..))
        ));
        let missing_relation = parse_query("SELECT u FROM User u JOIN u.Ghosts g").unwrap();
        assert!(matches!(
            renderer.render(&missing_relation),
            Err(Error::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn aggregate_over_a_collection_path_is_ambiguous() {
        let registry = registry();
        let parsed = parse_query("SELECT COUNT(u.Orders) FROM User u").unwrap();
        assert!(matches!(
            SqlRenderer::new(&registry, Dialect::Generic).render(&parsed),
            Err(Error::AmbiguousAggregate(..))
        ));
    }

    #[test]
    fn to_one_relationship_path_resolves_to_its_fk_column() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT o FROM Order o WHERE o.User = :user",
        );
        assert!(rendered.sql.contains("WHERE (o.user_id = @user)"));
    }

    #[test]
    fn literals_render_inline() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT u FROM User u WHERE u.Username = 'O''Brien' AND u.Id > 10 AND 1.5 < 2 AND u.Username IS NOT NULL AND NOT u.Id = 4294967296",
        );
        assert!(rendered.sql.contains("u.username = 'O''Brien'"));
        assert!(rendered.sql.contains("u.id > 10"));
        assert!(rendered.sql.contains("1.5 < 2"));
        assert!(rendered.sql.contains("u.username IS NOT NULL"));
        assert!(rendered.sql.contains("NOT (u.id = 4294967296)"));
    }

    #[test]
    fn group_having_order_clauses_render_in_order() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT u.Username, COUNT(u) FROM User u GROUP BY u.Username HAVING COUNT(u) > 1 ORDER BY u.Username DESC, u.Id",
        );
        assert_eq!(
            rendered.sql,
            "SELECT u.username, COUNT(u.id) FROM users AS u GROUP BY u.username \
             HAVING COUNT(u.id) > 1 ORDER BY u.username DESC, u.id"
        );
    }

    #[test]
    fn case_between_and_in_render() {
        let registry = registry();
        let rendered = render_select(
            &registry,
            Dialect::Generic,
            "SELECT CASE WHEN u.Id BETWEEN 1 AND 9 THEN 'small' ELSE 'big' END FROM User u WHERE u.Id IN (1, 2) AND u.Id IN :more",
        );
        assert!(rendered.sql.contains(
            "CASE WHEN u.id BETWEEN 1 AND 9 THEN 'small' ELSE 'big' END"
        ));
        assert!(rendered.sql.contains("u.id IN (1, 2)"));
        assert!(rendered.sql.contains("u.id IN (@more)"));
    }

    #[test]
    fn schema_qualifies_the_table() {
        let ledger = EntityDef::new("Ledger")
            .schema("finance")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Amount", Value::Decimal(None)));
        let registry = RegistryBuilder::new().register(ledger).build().unwrap();
        let rendered = render_select(&registry, Dialect::Generic, "SELECT l FROM Ledger l");
        assert!(rendered.sql.contains("FROM finance.ledgers AS l"));
    }
}
