use crate::{
    AggregateFunction, Assignment, BinaryOp, CaseBranch, DeleteStatement, EntityTarget, Error,
    Expr, InList, Join, JoinKind, Keyword, Lexer, OrderItem, ParsedQuery, Result, SelectItem,
    SelectStatement, Statement, Token, TokenKind, UnaryOp, UpdateStatement, Value,
};

/// Parse query source text into its statement tree.
///
/// Parsing is single-shot: the first failure is reported with its byte
/// offset and no recovery is attempted.
pub fn parse_query(source: &str) -> Result<ParsedQuery> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens, source.len()).parse()
}

/// Hand-written recursive descent over the token stream.
struct Parser {
    tokens: Vec<Token>,
    position: usize,
    end_offset: usize,
    parameters: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>, end_offset: usize) -> Self {
        Self {
            tokens,
            position: 0,
            end_offset,
            parameters: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<ParsedQuery> {
        let statement = match self.peek_keyword() {
            Some(Keyword::Select) => Statement::Select(self.select_statement()?),
            Some(Keyword::Update) => Statement::Update(self.update_statement()?),
            Some(Keyword::Delete) => Statement::Delete(self.delete_statement()?),
            _ => return Err(self.expected("SELECT, UPDATE or DELETE")),
        };
        self.accept(&TokenKind::Semicolon);
        if self.peek().is_some() {
            return Err(self.expected("end of query"));
        }
        Ok(ParsedQuery {
            statement,
            parameters: self.parameters,
        })
    }

    // Token plumbing.

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(kw)) => Some(*kw),
            _ => None,
        }
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end_offset)
    }

    fn expected(&self, expected: impl Into<String>) -> Error {
        Error::Parse {
            position: self.offset(),
            expected: expected.into(),
            found: self
                .peek()
                .map(|t| format!("`{}`", t.text))
                .unwrap_or_else(|| "end of input".to_string()),
        }
    }

    fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek_keyword() == Some(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, name: &str) -> Result<()> {
        if self.accept(&kind) {
            Ok(())
        } else {
            Err(self.expected(name))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, name: &str) -> Result<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.expected(name))
        }
    }

    /// A strict identifier. Used in alias positions, where a keyword must
    /// keep its keyword meaning for the grammar to stay predictive.
    fn identifier(&mut self, name: &str) -> Result<String> {
        match self.peek_kind() {
            Some(TokenKind::Ident(..)) => {
                let token = self.bump().unwrap_or_else(|| unreachable!());
                Ok(token.text.clone())
            }
            _ => Err(self.expected(name)),
        }
    }

    /// An identifier in entity or property position, where names may collide
    /// with weak keywords (a relationship called `Order`, a property called
    /// `Count`). The written lexeme is preserved.
    fn name_like(&mut self, name: &str) -> Result<String> {
        match self.peek_kind() {
            Some(TokenKind::Ident(..) | TokenKind::Keyword(..)) => {
                let token = self.bump().unwrap_or_else(|| unreachable!());
                Ok(token.text.clone())
            }
            _ => Err(self.expected(name)),
        }
    }

    /// Optional trailing alias: a plain identifier, never a keyword.
    fn optional_alias(&mut self) -> Option<String> {
        match self.peek_kind() {
            Some(TokenKind::Ident(..)) => self.bump().map(|t| t.text.clone()),
            _ => None,
        }
    }

    // Statements.

    fn select_statement(&mut self) -> Result<SelectStatement> {
        self.expect_keyword(Keyword::Select, "SELECT")?;
        let distinct = self.accept_keyword(Keyword::Distinct);
        let mut items = vec![self.select_item()?];
        while self.accept(&TokenKind::Comma) {
            items.push(self.select_item()?);
        }
        self.expect_keyword(Keyword::From, "FROM")?;
        let from = self.entity_target()?;
        let mut joins = Vec::new();
        while matches!(
            self.peek_keyword(),
            Some(Keyword::Join | Keyword::Inner | Keyword::Left | Keyword::Right)
        ) {
            joins.push(self.join()?);
        }
        let where_clause = self.optional_where()?;
        let mut group_by = Vec::new();
        if self.accept_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By, "BY")?;
            group_by.push(self.expression()?);
            while self.accept(&TokenKind::Comma) {
                group_by.push(self.expression()?);
            }
        }
        let having = if self.accept_keyword(Keyword::Having) {
            Some(self.expression()?)
        } else {
            None
        };
        let mut order_by = Vec::new();
        if self.accept_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By, "BY")?;
            order_by.push(self.order_item()?);
            while self.accept(&TokenKind::Comma) {
                order_by.push(self.order_item()?);
            }
        }
        Ok(SelectStatement {
            distinct,
            items,
            from,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
        })
    }

    fn update_statement(&mut self) -> Result<UpdateStatement> {
        self.expect_keyword(Keyword::Update, "UPDATE")?;
        let target = self.entity_target()?;
        self.expect_keyword(Keyword::Set, "SET")?;
        let mut assignments = vec![self.assignment(&target)?];
        while self.accept(&TokenKind::Comma) {
            assignments.push(self.assignment(&target)?);
        }
        let where_clause = self.optional_where()?;
        Ok(UpdateStatement {
            target,
            assignments,
            where_clause,
        })
    }

    fn delete_statement(&mut self) -> Result<DeleteStatement> {
        self.expect_keyword(Keyword::Delete, "DELETE")?;
        self.expect_keyword(Keyword::From, "FROM")?;
        let target = self.entity_target()?;
        let where_clause = self.optional_where()?;
        Ok(DeleteStatement {
            target,
            where_clause,
        })
    }

    fn optional_where(&mut self) -> Result<Option<Expr>> {
        if self.accept_keyword(Keyword::Where) {
            Ok(Some(self.expression()?))
        } else {
            Ok(None)
        }
    }

    fn entity_target(&mut self) -> Result<EntityTarget> {
        let entity = self.name_like("entity name")?;
        let alias = self.optional_alias().unwrap_or_else(|| entity.clone());
        Ok(EntityTarget { entity, alias })
    }

    fn join(&mut self) -> Result<Join> {
        let kind = if self.accept_keyword(Keyword::Inner) {
            JoinKind::Inner
        } else if self.accept_keyword(Keyword::Left) {
            JoinKind::Left
        } else if self.accept_keyword(Keyword::Right) {
            JoinKind::Right
        } else {
            JoinKind::Inner
        };
        self.expect_keyword(Keyword::Join, "JOIN")?;
        let source_alias = self.identifier("join path alias")?;
        self.expect(TokenKind::Dot, "`.`")?;
        let property = self.name_like("relationship name")?;
        let alias = self.optional_alias().unwrap_or_else(|| property.clone());
        Ok(Join {
            kind,
            source_alias,
            property,
            alias,
        })
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        let expr = self.expression()?;
        let alias = if self.accept_keyword(Keyword::As) {
            Some(self.name_like("projection alias")?)
        } else {
            self.optional_alias()
        };
        Ok(SelectItem { expr, alias })
    }

    fn order_item(&mut self) -> Result<OrderItem> {
        let expr = self.expression()?;
        let descending = if self.accept_keyword(Keyword::Desc) {
            true
        } else {
            self.accept_keyword(Keyword::Asc);
            false
        };
        Ok(OrderItem { expr, descending })
    }

    fn assignment(&mut self, target: &EntityTarget) -> Result<Assignment> {
        let first = self.name_like("assignment target")?;
        let (alias, property) = if self.accept(&TokenKind::Dot) {
            (first, self.name_like("property name")?)
        } else {
            // Unqualified column: bind against the statement target.
            (target.alias.clone(), first)
        };
        self.expect(TokenKind::Eq, "`=`")?;
        let value = self.expression()?;
        Ok(Assignment {
            alias,
            property,
            value,
        })
    }

    // Expression precedence ladder, lowest first.

    fn expression(&mut self) -> Result<Expr> {
        self.or_expression()
    }

    fn or_expression(&mut self) -> Result<Expr> {
        let mut left = self.and_expression()?;
        while self.accept_keyword(Keyword::Or) {
            let right = self.and_expression()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expr> {
        let mut left = self.not_expression()?;
        while self.accept_keyword(Keyword::And) {
            let right = self.not_expression()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expression(&mut self) -> Result<Expr> {
        if self.accept_keyword(Keyword::Not) {
            let operand = self.not_expression()?;
            Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            })
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let negated = matches!(self.peek_keyword(), Some(Keyword::Not));
        if negated {
            // Infix NOT only combines with LIKE / IN / BETWEEN.
            if !matches!(
                self.tokens.get(self.position + 1).map(|t| &t.kind),
                Some(TokenKind::Keyword(
                    Keyword::Like | Keyword::In | Keyword::Between
                ))
            ) {
                return Ok(left);
            }
            self.position += 1;
        }
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(BinaryOp::Eq),
            Some(TokenKind::Neq) => Some(BinaryOp::Ne),
            Some(TokenKind::Lt) => Some(BinaryOp::Lt),
            Some(TokenKind::Le) => Some(BinaryOp::Le),
            Some(TokenKind::Gt) => Some(BinaryOp::Gt),
            Some(TokenKind::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.position += 1;
            let right = self.additive()?;
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        match self.peek_keyword() {
            Some(Keyword::Like) => {
                self.position += 1;
                let pattern = self.additive()?;
                Ok(Expr::Like {
                    operand: Box::new(left),
                    pattern: Box::new(pattern),
                    negated,
                })
            }
            Some(Keyword::In) => {
                self.position += 1;
                let expr = Expr::In {
                    operand: Box::new(left),
                    list: self.in_list()?,
                };
                Ok(negate_if(negated, expr))
            }
            Some(Keyword::Between) => {
                self.position += 1;
                let low = self.additive()?;
                self.expect_keyword(Keyword::And, "AND")?;
                let high = self.additive()?;
                let expr = Expr::Between {
                    operand: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                };
                Ok(negate_if(negated, expr))
            }
            Some(Keyword::Is) => {
                self.position += 1;
                let negated = self.accept_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null, "NULL")?;
                Ok(Expr::IsNull {
                    operand: Box::new(left),
                    negated,
                })
            }
            _ => Ok(left),
        }
    }

    fn in_list(&mut self) -> Result<InList> {
        if let Some(TokenKind::Param(name)) = self.peek_kind() {
            let name = name.clone();
            self.position += 1;
            self.note_parameter(&name);
            return Ok(InList::Parameter(name));
        }
        self.expect(TokenKind::LParen, "`(`")?;
        let mut items = vec![self.expression()?];
        while self.accept(&TokenKind::Comma) {
            items.push(self.expression()?);
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(InList::Items(items))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.position += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.position += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.accept(&TokenKind::Minus) {
            let operand = self.unary()?;
            Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            })
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.position += 1;
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            Some(TokenKind::Param(name)) => {
                let name = name.clone();
                self.position += 1;
                self.note_parameter(&name);
                Ok(Expr::Parameter(name))
            }
            Some(TokenKind::Int(value)) => {
                let value = *value;
                self.position += 1;
                // 32-bit literals stay narrow, wider ones widen to 64 bits.
                Ok(Expr::Literal(match i32::try_from(value) {
                    Ok(narrow) => Value::Int32(Some(narrow)),
                    Err(..) => Value::Int64(Some(value)),
                }))
            }
            Some(TokenKind::Float(value)) => {
                let value = *value;
                self.position += 1;
                Ok(Expr::Literal(Value::Float64(Some(value))))
            }
            Some(TokenKind::Str(value)) => {
                let value = value.clone();
                self.position += 1;
                Ok(Expr::Literal(Value::Varchar(Some(value))))
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Boolean(Some(true))))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Boolean(Some(false))))
            }
            Some(TokenKind::Keyword(Keyword::Null)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Null))
            }
            Some(TokenKind::Keyword(Keyword::Case)) => self.case_expression(),
            Some(TokenKind::Keyword(
                kw @ (Keyword::Count | Keyword::Sum | Keyword::Avg | Keyword::Min | Keyword::Max),
            )) => {
                let function = match kw {
                    Keyword::Count => AggregateFunction::Count,
                    Keyword::Sum => AggregateFunction::Sum,
                    Keyword::Avg => AggregateFunction::Avg,
                    Keyword::Min => AggregateFunction::Min,
                    _ => AggregateFunction::Max,
                };
                self.position += 1;
                self.expect(TokenKind::LParen, "`(`")?;
                let distinct = self.accept_keyword(Keyword::Distinct);
                let operand = self.expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(Expr::Aggregate {
                    function,
                    distinct,
                    operand: Box::new(operand),
                })
            }
            Some(TokenKind::Ident(..)) => {
                let name = self.identifier("expression")?;
                if self.accept(&TokenKind::Dot) {
                    let property = self.name_like("property name")?;
                    Ok(Expr::Column {
                        alias: name,
                        property,
                    })
                } else if self.accept(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.peek_kind() != Some(&TokenKind::RParen) {
                        args.push(self.expression()?);
                        while self.accept(&TokenKind::Comma) {
                            args.push(self.expression()?);
                        }
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                    Ok(Expr::Function { name, args })
                } else {
                    Ok(Expr::Object(name))
                }
            }
            _ => Err(self.expected("expression")),
        }
    }

    fn case_expression(&mut self) -> Result<Expr> {
        self.expect_keyword(Keyword::Case, "CASE")?;
        let operand = if self.peek_keyword() != Some(Keyword::When) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        let mut branches = Vec::new();
        while self.accept_keyword(Keyword::When) {
            let when = self.expression()?;
            self.expect_keyword(Keyword::Then, "THEN")?;
            let then = self.expression()?;
            branches.push(CaseBranch { when, then });
        }
        if branches.is_empty() {
            return Err(self.expected("WHEN"));
        }
        let otherwise = if self.accept_keyword(Keyword::Else) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End, "END")?;
        Ok(Expr::Case {
            operand,
            branches,
            otherwise,
        })
    }

    fn note_parameter(&mut self, name: &str) {
        if !self.parameters.iter().any(|p| p == name) {
            self.parameters.push(name.to_string());
        }
    }
}

fn negate_if(negated: bool, expr: Expr) -> Expr {
    if negated {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(expr),
        }
    } else {
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_with_parameters() {
        let parsed = parse_query("SELECT u FROM User u WHERE u.Username = :username").unwrap();
        assert_eq!(parsed.parameters, vec!["username"]);
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert_eq!(select.from.entity, "User");
        assert_eq!(select.from.alias, "u");
        assert_eq!(select.items.len(), 1);
        assert_eq!(select.items[0].expr, Expr::Object("u".into()));
    }

    #[test]
    fn parameter_set_is_deduplicated_in_order() {
        let parsed = parse_query(
            "SELECT u FROM User u WHERE u.A = :b AND u.B = :a OR u.C = :b AND u.D = :c",
        )
        .unwrap();
        assert_eq!(parsed.parameters, vec!["b", "a", "c"]);
    }

    #[test]
    fn default_alias_is_the_entity_name() {
        let parsed = parse_query("DELETE FROM Product").unwrap();
        assert_eq!(parsed.root().alias, "Product");
    }

    #[test]
    fn join_kinds_and_aliases() {
        let parsed = parse_query(
            "SELECT o FROM Order o LEFT JOIN o.Customer c INNER JOIN c.Addresses JOIN o.Lines l",
        )
        .unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert_eq!(select.joins.len(), 3);
        assert_eq!(select.joins[0].kind, JoinKind::Left);
        assert_eq!(select.joins[0].alias, "c");
        assert_eq!(select.joins[1].kind, JoinKind::Inner);
        assert_eq!(select.joins[1].alias, "Addresses");
        assert_eq!(select.joins[2].kind, JoinKind::Inner);
        assert_eq!(select.joins[2].source_alias, "o");
    }

    #[test]
    fn weak_keyword_as_relationship_name() {
        // `Order` is also a keyword, but after a dot it is a property name.
        let parsed = parse_query("SELECT c FROM Customer c JOIN c.Order o").unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert_eq!(select.joins[0].property, "Order");
    }

    #[test]
    fn precedence_or_binds_loosest() {
        let parsed = parse_query("SELECT u FROM User u WHERE u.A = 1 OR u.B = 2 AND u.C = 3")
            .unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        let Some(Expr::Binary { op: BinaryOp::Or, right, .. }) = &select.where_clause else {
            panic!("OR must be at the root");
        };
        assert!(matches!(
            right.as_ref(),
            Expr::Binary { op: BinaryOp::And, .. }
        ));
    }

    #[test]
    fn arithmetic_precedence() {
        let parsed = parse_query("SELECT u FROM User u WHERE u.A = 1 + 2 * 3").unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        let Some(Expr::Binary { op: BinaryOp::Eq, right, .. }) = &select.where_clause else {
            panic!("= must be at the root");
        };
        let Expr::Binary { op: BinaryOp::Add, right, .. } = right.as_ref() else {
            panic!("+ must be above *");
        };
        assert!(matches!(
            right.as_ref(),
            Expr::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn comparison_suffixes() {
        let parsed = parse_query(
            "SELECT u FROM User u WHERE u.A LIKE 'x%' AND u.B NOT LIKE 'y' \
             AND u.C IS NOT NULL AND u.D BETWEEN 1 AND 10 AND u.E NOT IN (1, 2) AND u.F IN :ids",
        )
        .unwrap();
        assert_eq!(parsed.parameters, vec!["ids"]);
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        let mut found_negated_like = false;
        let mut found_not_in = false;
        let mut stack = vec![select.where_clause.as_ref().unwrap()];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Binary { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
                Expr::Like { negated, .. } if *negated => found_negated_like = true,
                Expr::Unary { op: UnaryOp::Not, operand } => {
                    found_not_in |= matches!(operand.as_ref(), Expr::In { .. });
                }
                _ => {}
            }
        }
        assert!(found_negated_like);
        assert!(found_not_in);
    }

    #[test]
    fn aggregate_with_distinct() {
        let parsed = parse_query("SELECT COUNT(DISTINCT c) FROM Customer c").unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert_eq!(
            select.items[0].expr,
            Expr::Aggregate {
                function: AggregateFunction::Count,
                distinct: true,
                operand: Box::new(Expr::Object("c".into())),
            }
        );
    }

    #[test]
    fn update_and_assignments() {
        let parsed =
            parse_query("UPDATE TestCustomer c SET c.IsActive = :active WHERE c.Id = :id").unwrap();
        assert_eq!(parsed.parameters, vec!["active", "id"]);
        let Statement::Update(update) = &parsed.statement else {
            panic!("expected an update");
        };
        assert_eq!(update.target.entity, "TestCustomer");
        assert_eq!(update.assignments[0].property, "IsActive");
    }

    #[test]
    fn case_expression_round_trip() {
        let parsed = parse_query(
            "SELECT CASE WHEN u.Age >= 18 THEN 'adult' ELSE 'minor' END FROM User u",
        )
        .unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert!(matches!(select.items[0].expr, Expr::Case { .. }));
    }

    #[test]
    fn group_having_order() {
        let parsed = parse_query(
            "SELECT u.Country, COUNT(u) FROM User u GROUP BY u.Country \
             HAVING COUNT(u) > 10 ORDER BY u.Country DESC, u.City",
        )
        .unwrap();
        let Statement::Select(select) = &parsed.statement else {
            panic!("expected a select");
        };
        assert_eq!(select.group_by.len(), 1);
        assert!(select.having.is_some());
        assert_eq!(select.order_by.len(), 2);
        assert!(select.order_by[0].descending);
        assert!(!select.order_by[1].descending);
    }

    #[test]
    fn errors_carry_position_and_expectation() {
        let result = parse_query("SELECT u FROM");
        let Err(Error::Parse { position, expected, found }) = result else {
            panic!("expected a parse error");
        };
        assert_eq!(position, 13);
        assert_eq!(expected, "entity name");
        assert_eq!(found, "end of input");
    }

    #[test]
    fn no_recovery_on_trailing_tokens() {
        assert!(matches!(
            parse_query("DELETE FROM User u WHERE u.Id = 1 garbage ("),
            Err(Error::Parse { .. })
        ));
    }
}
