use keel::{
    Cascade, Command, CommandExecutor, EntityDef, Isolation, JoinTable, KeyGeneration,
    PropertyDef, QueryOutcome, Registry, RegistryBuilder, RelationDef, Result, RowLabeled,
    RowsAffected, Value, stream,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

/// One scripted response for the next executed statement.
pub enum Scripted {
    Rows(Vec<Vec<(&'static str, Value)>>),
    Affected {
        rows: u64,
        last_insert_id: Option<i64>,
    },
    Fail(&'static str),
}

#[derive(Default)]
struct ExecutorState {
    commands: Vec<Command>,
    transactions: Vec<&'static str>,
    script: VecDeque<Scripted>,
    next_id: i64,
}

impl ExecutorState {
    fn respond(&mut self) -> Vec<Result<QueryOutcome>> {
        match self.script.pop_front() {
            Some(Scripted::Rows(rows)) => rows
                .into_iter()
                .map(|columns| {
                    let labels: Arc<[String]> = columns
                        .iter()
                        .map(|(label, _)| label.to_string())
                        .collect();
                    let values: Box<[Value]> =
                        columns.into_iter().map(|(_, value)| value).collect();
                    Ok(QueryOutcome::Row(RowLabeled::new(labels, values)))
                })
                .collect(),
            Some(Scripted::Affected {
                rows,
                last_insert_id,
            }) => vec![Ok(QueryOutcome::Affected(RowsAffected {
                rows_affected: Some(rows),
                last_insert_id,
            }))],
            Some(Scripted::Fail(message)) => vec![Err(keel::Error::executor(message))],
            None => {
                self.next_id += 1;
                vec![Ok(QueryOutcome::Affected(RowsAffected {
                    rows_affected: Some(1),
                    last_insert_id: Some(self.next_id),
                }))]
            }
        }
    }
}

/// In-memory executor driving the manager in tests.
///
/// Cloning shares the state, so a test can keep one handle for scripting
/// and inspection while the manager owns another. Every statement is
/// logged. Responses come from the script queue; with an empty queue the
/// executor acknowledges with one affected row and a fresh auto-increment
/// id, which is what an insert on a last-insert-id backend looks like.
#[derive(Default, Clone)]
pub struct ScriptedExecutor {
    state: Rc<RefCell<ExecutorState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, scripted: Scripted) {
        self.state.borrow_mut().script.push_back(scripted);
    }

    pub fn push_rows(&self, rows: Vec<Vec<(&'static str, Value)>>) {
        self.push(Scripted::Rows(rows));
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// SQL texts of every executed statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state
            .borrow()
            .commands
            .iter()
            .map(|c| c.sql.clone())
            .collect()
    }

    pub fn transactions(&self) -> Vec<&'static str> {
        self.state.borrow().transactions.clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run<'s>(
        &'s mut self,
        command: Command,
    ) -> impl stream::Stream<Item = Result<QueryOutcome>> + 's {
        let outcomes = {
            let mut state = self.state.borrow_mut();
            state.commands.push(command);
            state.respond()
        };
        stream::iter(outcomes)
    }

    async fn begin(&mut self, _isolation: Isolation) -> Result<()> {
        self.state.borrow_mut().transactions.push("begin");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.state.borrow_mut().transactions.push("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.borrow_mut().transactions.push("rollback");
        Ok(())
    }
}

/// Registry used across the manager tests: users with orders, companies
/// with employees (orphan removal), tenant-scoped products, and a
/// many-to-many between students and courses.
pub fn sample_registry() -> Arc<Registry> {
    let user = EntityDef::new("User")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Username", Value::Varchar(None)))
        .relation(
            RelationDef::one_to_many("Orders", "Order")
                .mapped_by("User")
                .cascade(Cascade::PERSIST),
        )
        .named_query("byName", "SELECT u FROM User u WHERE u.Username = :name")
        .native_named_query("rawAll", "SELECT id, username FROM users");
    let order = EntityDef::new("Order")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("UserId", Value::Int64(None)))
        .property(PropertyDef::new("Total", Value::Decimal(None)).nullable())
        .relation(RelationDef::many_to_one("User", "User"));
    let company = EntityDef::new("Company")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Name", Value::Varchar(None)))
        .relation(
            RelationDef::one_to_many("Employees", "Employee")
                .mapped_by("Company")
                .cascade(Cascade::ALL)
                .orphan_removal(),
        );
    let employee = EntityDef::new("Employee")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Name", Value::Varchar(None)))
        .property(PropertyDef::new("CompanyId", Value::Int64(None)))
        .relation(RelationDef::many_to_one("Company", "Company"));
    let product = EntityDef::new("Product")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Name", Value::Varchar(None)))
        .property(PropertyDef::new("TenantId", Value::Varchar(None)))
        .tenant("TenantId");
    let student = EntityDef::new("Student")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Name", Value::Varchar(None)))
        .relation(
            RelationDef::many_to_many("Courses", "Course")
                .join_table(JoinTable::new("student_courses", "student_id", "course_id"))
                .cascade(Cascade::PERSIST),
        );
    let course = EntityDef::new("Course")
        .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity))
        .property(PropertyDef::new("Title", Value::Varchar(None)))
        .relation(RelationDef::many_to_many("Students", "Student").mapped_by("Courses"));
    Arc::new(
        RegistryBuilder::new()
            .register(user)
            .register(order)
            .register(company)
            .register(employee)
            .register(product)
            .register(student)
            .register(course)
            .build()
            .expect("sample registry must validate"),
    )
}
