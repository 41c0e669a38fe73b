use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::access::{self, AccessGuard, GuideGrant, Roster};
use crate::auth::RosterAuthSource;
use crate::engine::{EngineError, TenantEngine};
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct DaybookHandler {
    tenant_manager: Arc<TenantManager>,
    guard: Arc<dyn AccessGuard>,
    query_parser: Arc<DaybookQueryParser>,
}

impl DaybookHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, guard: Arc<dyn AccessGuard>) -> Self {
        Self {
            tenant_manager,
            guard,
            query_parser: Arc::new(DaybookQueryParser),
        }
    }

    /// Open (or create) the tenant. Only called with a grant in hand, so an
    /// unauthorized caller never materializes a journal.
    fn engine(&self, grant: &GuideGrant) -> PgWireResult<Arc<TenantEngine>> {
        self.tenant_manager
            .get_or_create(grant.organization_id())
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    /// Parse, authorize and run one statement, recording RED metrics.
    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let (organization_id, caller) = identity(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);

        let start = std::time::Instant::now();
        let result = self.execute_command(&organization_id, &caller, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn grant(
        &self,
        organization_id: &str,
        caller: &str,
        cmd: &Command,
    ) -> PgWireResult<GuideGrant> {
        let guide_id = cmd.guide_id();
        match cmd {
            // Bookings come from the booking workflow, never from the guide.
            Command::RecordBooking { .. } => {
                access::authorize_admin(&*self.guard, caller, organization_id)
                    .await
                    .map_err(engine_err)?;
                Ok(GuideGrant::new(organization_id, guide_id))
            }
            _ => access::authorize(&*self.guard, caller, organization_id, guide_id)
                .await
                .map_err(engine_err),
        }
    }

    async fn execute_command(
        &self,
        organization_id: &str,
        caller: &str,
        cmd: Command,
    ) -> PgWireResult<Response> {
        let grant = self.grant(organization_id, caller, &cmd).await?;
        let engine = self.engine(&grant)?;

        match cmd {
            Command::SetDaySlots {
                date, directives, ..
            } => {
                engine
                    .set_day_slots(&grant, date, &directives)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(directives.len())))
            }
            Command::BulkSetAvailability { request, .. } => {
                let outcome = engine
                    .bulk_set_availability(&grant, &request)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(bulk_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(outcome.count() as i64))?;
                encoder.encode_field(&(outcome.created as i64))?;
                encoder.encode_field(&(outcome.updated as i64))?;
                encoder.encode_field(&(outcome.skipped as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::RecordBooking {
                booking_id,
                date,
                time_slot,
                ..
            } => {
                engine
                    .record_booking(&grant, date, time_slot, booking_id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::ListSlots { from, to, .. } => {
                let slots = engine.list_slots(&grant, from, to).await.map_err(engine_err)?;
                debug!(guide_id = %grant.guide_profile_id(), rows = slots.len(), "slots listed");

                let schema = Arc::new(slots_schema());
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&slot.id.to_string())?;
                        encoder.encode_field(&slot.guide_profile_id.to_string())?;
                        encoder.encode_field(&slot.date.to_string())?;
                        encoder.encode_field(&slot.time_slot.as_str())?;
                        encoder.encode_field(&slot.status.as_str())?;
                        encoder.encode_field(&slot.booking_id.map(|b| b.to_string()))?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

/// Organization (database name) and caller (user) from the startup packet.
fn identity<C: ClientInfo>(client: &C) -> (String, String) {
    let metadata = client.metadata();
    let organization_id = metadata
        .get("database")
        .cloned()
        .unwrap_or_else(|| "default".to_string());
    let caller = metadata.get("user").cloned().unwrap_or_default();
    (organization_id, caller)
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn count_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("guide_id"),
        text_field("slot_date"),
        text_field("time_slot"),
        text_field("status"),
        text_field("booking_id"),
    ]
}

fn bulk_schema() -> Vec<FieldInfo> {
    vec![
        count_field("count"),
        count_field("created"),
        count_field("updated"),
        count_field("skipped"),
    ]
}

/// Result columns a statement will produce, judged from its text alone.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_uppercase();
    if upper.contains("BULK_AVAILABILITY") {
        bulk_schema()
    } else if upper.starts_with("SELECT") && upper.contains("SLOTS") {
        slots_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for DaybookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct DaybookQueryParser;

#[async_trait]
impl QueryParser for DaybookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for DaybookHandler {
    type Statement = String;
    type QueryParser = DaybookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(client, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Replace `$1`, `$2`, ... with bound parameter values as quoted text.
/// Highest index first, so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct DaybookFactory {
    handler: Arc<DaybookHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<RosterAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl DaybookFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, roster: Arc<Roster>, password: String) -> Self {
        let auth_source = RosterAuthSource::new(roster.clone(), password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(DaybookHandler::new(tenant_manager, roster)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for DaybookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    roster: Arc<Roster>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(DaybookFactory::new(tenant_manager, roster, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_err(e: EngineError) -> PgWireError {
    match e {
        EngineError::Forbidden => {
            metrics::counter!(observability::ACCESS_DENIED_TOTAL).increment(1);
            user_error("42501", e.to_string())
        }
        other => user_error("P0001", other.to_string()),
    }
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
