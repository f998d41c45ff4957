//! Tool/action table and typed parameter records
//!
//! Every request the gateway accepts is a `(tool, action, params)` triple.
//! The table of known pairs is static: [`ToolAction::parse`] resolves the
//! pair, and each entry carries its [`AccessMode`] marker so the safety gate
//! is a table lookup, never an inspection of SQL text.
//!
//! Each action owns a typed parameter record deserialized at the dispatch
//! boundary. A record declares exactly the fields its handler reads.

use serde::Deserialize;
use serde_json::Value;

/// Access marker attached to every action in the static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// No data or schema mutation.
    Read,
    /// Mutates data or schema; subject to the default-deny safety gate.
    Write,
    /// Transaction and registry management.
    Control,
}

/// Every `(tool, action)` pair the gateway dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolAction {
    QueryRead,
    QueryWrite,
    QueryExplain,
    QueryTransaction,
    SchemaList,
    SchemaDescribe,
    SchemaCreate,
    SchemaAlter,
    SchemaDrop,
    TxBegin,
    TxCommit,
    TxRollback,
    TxSavepoint,
    TxRelease,
    TxList,
    AdminVacuum,
    AdminAnalyze,
    AdminReindex,
    AdminSettingsGet,
    AdminSettingsSet,
    MonitorActivity,
    MonitorLocks,
    MonitorTableStats,
    MonitorDatabaseSize,
}

impl ToolAction {
    /// Resolve a `(tool, action)` pair against the static table.
    pub fn parse(tool: &str, action: &str) -> Option<Self> {
        use ToolAction::*;
        let entry = match (tool, action) {
            ("query", "read") => QueryRead,
            ("query", "write") => QueryWrite,
            ("query", "explain") => QueryExplain,
            ("query", "transaction") => QueryTransaction,
            ("schema", "list") => SchemaList,
            ("schema", "describe") => SchemaDescribe,
            ("schema", "create") => SchemaCreate,
            ("schema", "alter") => SchemaAlter,
            ("schema", "drop") => SchemaDrop,
            ("transaction", "begin") => TxBegin,
            ("transaction", "commit") => TxCommit,
            ("transaction", "rollback") => TxRollback,
            ("transaction", "savepoint") => TxSavepoint,
            ("transaction", "release") => TxRelease,
            ("transaction", "list") => TxList,
            ("admin", "vacuum") => AdminVacuum,
            ("admin", "analyze") => AdminAnalyze,
            ("admin", "reindex") => AdminReindex,
            ("admin", "settings_get") => AdminSettingsGet,
            ("admin", "settings_set") => AdminSettingsSet,
            ("monitor", "activity") => MonitorActivity,
            ("monitor", "locks") => MonitorLocks,
            ("monitor", "table_stats") => MonitorTableStats,
            ("monitor", "database_size") => MonitorDatabaseSize,
            _ => return None,
        };
        Some(entry)
    }

    /// The access marker for this action.
    pub fn mode(self) -> AccessMode {
        use ToolAction::*;
        match self {
            QueryRead | QueryExplain | SchemaList | SchemaDescribe | AdminVacuum
            | AdminAnalyze | AdminReindex | AdminSettingsGet | MonitorActivity
            | MonitorLocks | MonitorTableStats | MonitorDatabaseSize => AccessMode::Read,
            QueryWrite | QueryTransaction | SchemaCreate | SchemaAlter | SchemaDrop
            | AdminSettingsSet => AccessMode::Write,
            TxBegin | TxCommit | TxRollback | TxSavepoint | TxRelease | TxList => {
                AccessMode::Control
            }
        }
    }

    pub fn tool(self) -> &'static str {
        use ToolAction::*;
        match self {
            QueryRead | QueryWrite | QueryExplain | QueryTransaction => "query",
            SchemaList | SchemaDescribe | SchemaCreate | SchemaAlter | SchemaDrop => "schema",
            TxBegin | TxCommit | TxRollback | TxSavepoint | TxRelease | TxList => "transaction",
            AdminVacuum | AdminAnalyze | AdminReindex | AdminSettingsGet | AdminSettingsSet => {
                "admin"
            }
            MonitorActivity | MonitorLocks | MonitorTableStats | MonitorDatabaseSize => "monitor",
        }
    }

    pub fn action(self) -> &'static str {
        use ToolAction::*;
        match self {
            QueryRead => "read",
            QueryWrite => "write",
            QueryExplain => "explain",
            QueryTransaction => "transaction",
            SchemaList => "list",
            SchemaDescribe => "describe",
            SchemaCreate => "create",
            SchemaAlter => "alter",
            SchemaDrop => "drop",
            TxBegin => "begin",
            TxCommit => "commit",
            TxRollback => "rollback",
            TxSavepoint => "savepoint",
            TxRelease => "release",
            TxList => "list",
            AdminVacuum => "vacuum",
            AdminAnalyze => "analyze",
            AdminReindex => "reindex",
            AdminSettingsGet => "settings_get",
            AdminSettingsSet => "settings_set",
            MonitorActivity => "activity",
            MonitorLocks => "locks",
            MonitorTableStats => "table_stats",
            MonitorDatabaseSize => "database_size",
        }
    }
}

/// Per-statement execution options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementOptions {
    /// Server-side statement timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// `query.read`
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub options: StatementOptions,
}

/// `query.write`
#[derive(Debug, Deserialize)]
pub struct WriteParams {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub autocommit: bool,
    #[serde(default)]
    pub options: StatementOptions,
}

/// `query.explain`
#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub options: ExplainOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExplainOptions {
    /// Executes the statement. Analyzing a mutating statement mutates.
    #[serde(default)]
    pub analyze: bool,
    /// One of `text`, `json`, `xml`, `yaml`.
    pub format: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// One entry of a `query.transaction` batch.
#[derive(Debug, Deserialize)]
pub struct BatchOperation {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// `query.transaction`
#[derive(Debug, Deserialize)]
pub struct BatchParams {
    pub operations: Vec<BatchOperation>,
}

/// Catalog object kinds addressable by the schema tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaTarget {
    Schema,
    Table,
    View,
    MaterializedView,
    Index,
    Function,
    Trigger,
    Sequence,
    Constraint,
}

impl SchemaTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::View => "view",
            Self::MaterializedView => "materialized_view",
            Self::Index => "index",
            Self::Function => "function",
            Self::Trigger => "trigger",
            Self::Sequence => "sequence",
            Self::Constraint => "constraint",
        }
    }
}

/// `schema.list`
#[derive(Debug, Deserialize)]
pub struct SchemaListParams {
    pub target: SchemaTarget,
    pub schema: Option<String>,
    pub table: Option<String>,
    #[serde(default)]
    pub options: ListOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOptions {
    #[serde(default = "ListOptions::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Include materialized views when listing views.
    #[serde(default)]
    pub include_materialized: bool,
}

impl ListOptions {
    fn default_limit() -> i64 {
        100
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
            include_materialized: false,
        }
    }
}

/// `schema.describe`
#[derive(Debug, Deserialize)]
pub struct DescribeParams {
    pub target: SchemaTarget,
    pub name: String,
    pub schema: Option<String>,
    pub session_id: Option<String>,
}

/// `schema.create` / `schema.alter` / `schema.drop`
#[derive(Debug, Deserialize)]
pub struct DdlParams {
    pub target: SchemaTarget,
    pub name: String,
    pub schema: Option<String>,
    /// Passed through verbatim; column lists and view bodies are too complex
    /// to safely reparse.
    pub definition: Option<String>,
    #[serde(default)]
    pub options: DdlOptions,
    pub session_id: Option<String>,
    #[serde(default)]
    pub autocommit: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DdlOptions {
    #[serde(default)]
    pub if_exists: bool,
    #[serde(default)]
    pub if_not_exists: bool,
    #[serde(default)]
    pub cascade: bool,
}

/// `transaction.begin`
#[derive(Debug, Default, Deserialize)]
pub struct BeginParams {
    #[serde(default)]
    pub options: BeginOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeginOptions {
    pub isolation: Option<IsolationLevel>,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// `transaction.commit` / `transaction.rollback`
#[derive(Debug, Deserialize)]
pub struct SessionRefParams {
    pub session_id: Option<String>,
}

/// `transaction.savepoint` / `transaction.release`
#[derive(Debug, Deserialize)]
pub struct SavepointParams {
    pub session_id: Option<String>,
    pub name: String,
}

/// `admin.vacuum`
#[derive(Debug, Deserialize)]
pub struct VacuumParams {
    pub table: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub options: VacuumOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VacuumOptions {
    #[serde(default)]
    pub full: bool,
    #[serde(default)]
    pub analyze: bool,
}

/// `admin.analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub table: Option<String>,
    pub schema: Option<String>,
}

/// `admin.reindex`
#[derive(Debug, Deserialize)]
pub struct ReindexParams {
    pub target: ReindexTarget,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexTarget {
    Table,
    Index,
}

/// `admin.settings_get`
#[derive(Debug, Deserialize)]
pub struct SettingsGetParams {
    pub name: Option<String>,
}

/// `admin.settings_set`
#[derive(Debug, Deserialize)]
pub struct SettingsSetParams {
    pub name: String,
    pub value: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub autocommit: bool,
}

/// `monitor.table_stats`
#[derive(Debug, Deserialize)]
pub struct TableStatsParams {
    pub schema: Option<String>,
}

/// The two fields the safety gate reads from any write-marked action's
/// params before the handler's own record is deserialized.
#[derive(Debug, Default, Deserialize)]
pub struct SafetyFields {
    pub session_id: Option<String>,
    #[serde(default)]
    pub autocommit: bool,
}
