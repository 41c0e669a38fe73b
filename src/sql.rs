use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `INSERT INTO day_slots (guide_id, slot_date, time_slot, status) VALUES ...`
    SetDaySlots {
        guide_id: Ulid,
        date: NaiveDate,
        directives: Vec<SlotDirective>,
    },
    /// `INSERT INTO bulk_availability (guide_id, from_date, to_date, weekdays, time_slots, status) VALUES (...)`
    BulkSetAvailability {
        guide_id: Ulid,
        request: BulkRequest,
    },
    /// `INSERT INTO bookings (booking_id, guide_id, slot_date, time_slot) VALUES (...)`
    RecordBooking {
        booking_id: Ulid,
        guide_id: Ulid,
        date: NaiveDate,
        time_slot: TimeSlot,
    },
    /// `SELECT * FROM slots WHERE guide_id = .. AND slot_date >= .. AND slot_date <= ..`
    ListSlots {
        guide_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
}

impl Command {
    pub fn guide_id(&self) -> Ulid {
        match self {
            Command::SetDaySlots { guide_id, .. }
            | Command::BulkSetAvailability { guide_id, .. }
            | Command::RecordBooking { guide_id, .. }
            | Command::ListSlots { guide_id, .. } => *guide_id,
        }
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(first) = stmts.first() else {
        return Err(SqlError::Empty);
    };
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match first {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_all_insert_rows(insert)?;

    match table.as_str() {
        "day_slots" => parse_day_slots(&rows),
        "bulk_availability" => {
            let values = single_row("bulk_availability", &rows)?;
            if values.len() < 6 {
                return Err(SqlError::WrongArity("bulk_availability", 6, values.len()));
            }
            Ok(Command::BulkSetAvailability {
                guide_id: parse_ulid(&values[0])?,
                request: BulkRequest {
                    start: parse_date(&values[1])?,
                    end: parse_date(&values[2])?,
                    weekdays: parse_weekdays(&values[3])?,
                    time_slots: parse_time_slots(&values[4])?,
                    status: parse_slot_status(&values[5])?,
                },
            })
        }
        "bookings" => {
            let values = single_row("bookings", &rows)?;
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            Ok(Command::RecordBooking {
                booking_id: parse_ulid(&values[0])?,
                guide_id: parse_ulid(&values[1])?,
                date: parse_date(&values[2])?,
                time_slot: parse_time_slot(&values[3])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// One row per directive; every row must name the same guide and date.
fn parse_day_slots(rows: &[Vec<Expr>]) -> Result<Command, SqlError> {
    let mut target: Option<(Ulid, NaiveDate)> = None;
    let mut directives = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        if row.len() < 4 {
            return Err(SqlError::WrongArity("day_slots row", 4, row.len()));
        }
        let at_row = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
        let guide_id = parse_ulid(&row[0]).map_err(at_row)?;
        let date = parse_date(&row[1]).map_err(at_row)?;
        match target {
            None => target = Some((guide_id, date)),
            Some(t) if t == (guide_id, date) => {}
            Some(_) => {
                return Err(SqlError::Parse(format!(
                    "row {i}: all day_slots rows must share guide_id and slot_date"
                )));
            }
        }
        directives.push(SlotDirective::new(
            parse_time_slot(&row[2]).map_err(at_row)?,
            parse_desired_status(&row[3]).map_err(at_row)?,
        ));
    }

    let (guide_id, date) = target.ok_or_else(|| SqlError::Parse("empty VALUES".into()))?;
    Ok(Command::SetDaySlots {
        guide_id,
        date,
        directives,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    if table != "slots" {
        return Err(SqlError::UnknownTable(table));
    }

    let mut filters = SlotFilters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }

    Ok(Command::ListSlots {
        guide_id: filters.guide_id.ok_or(SqlError::MissingFilter("guide_id"))?,
        from: filters.from.ok_or(SqlError::MissingFilter("slot_date >="))?,
        to: filters.to.ok_or(SqlError::MissingFilter("slot_date <="))?,
    })
}

#[derive(Default)]
struct SlotFilters {
    guide_id: Option<Ulid>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl SlotFilters {
    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner)?,
            Expr::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And => {
                    self.collect(left)?;
                    self.collect(right)?;
                }
                ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                    Some("guide_id") => self.guide_id = Some(parse_ulid(right)?),
                    Some("slot_date") => {
                        let d = parse_date(right)?;
                        self.from = Some(d);
                        self.to = Some(d);
                    }
                    _ => {}
                },
                ast::BinaryOperator::GtEq if is_date_column(left) => {
                    self.from = Some(parse_date(right)?);
                }
                ast::BinaryOperator::LtEq if is_date_column(left) => {
                    self.to = Some(parse_date(right)?);
                }
                _ => {}
            },
            Expr::Between {
                expr,
                negated: false,
                low,
                high,
            } if is_date_column(expr) => {
                self.from = Some(parse_date(low)?);
                self.to = Some(parse_date(high)?);
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_date_column(expr: &Expr) -> bool {
    expr_column_name(expr).as_deref() == Some("slot_date")
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn single_row<'a>(table: &'static str, rows: &'a [Vec<Expr>]) -> Result<&'a [Expr], SqlError> {
    match rows {
        [row] => Ok(row.as_slice()),
        _ => Err(SqlError::Unsupported(format!("{table}: one row per statement"))),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// Text of a string or numeric literal. `NULL` is `None`.
fn literal_text(expr: &Expr) -> Result<Option<&str>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(Some(s.as_str())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn required_text<'a>(expr: &'a Expr, what: &str) -> Result<&'a str, SqlError> {
    literal_text(expr)?.ok_or_else(|| SqlError::Parse(format!("{what} must not be NULL")))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = required_text(expr, "id")?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = required_text(expr, "date")?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_time_slot(expr: &Expr) -> Result<TimeSlot, SqlError> {
    let s = required_text(expr, "time_slot")?;
    TimeSlot::from_name(s).ok_or_else(|| SqlError::Parse(format!("bad time_slot: {s}")))
}

fn parse_slot_status(expr: &Expr) -> Result<SlotStatus, SqlError> {
    let s = required_text(expr, "status")?;
    SlotStatus::from_name(s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))
}

/// `NULL` and `'unset'` both clear the slot.
fn parse_desired_status(expr: &Expr) -> Result<DesiredStatus, SqlError> {
    match literal_text(expr)? {
        None => Ok(DesiredStatus::Unset),
        Some(s) => DesiredStatus::from_name(s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}"))),
    }
}

/// Comma-separated weekday numbers, `0` = Sunday. A bare number is one weekday.
fn parse_weekdays(expr: &Expr) -> Result<Vec<u8>, SqlError> {
    let s = required_text(expr, "weekdays")?;
    split_list(s)
        .map(|part| {
            part.parse::<u8>()
                .map_err(|e| SqlError::Parse(format!("bad weekday {part:?}: {e}")))
        })
        .collect()
}

/// Comma-separated time slot names.
fn parse_time_slots(expr: &Expr) -> Result<Vec<TimeSlot>, SqlError> {
    let s = required_text(expr, "time_slots")?;
    split_list(s)
        .map(|part| TimeSlot::from_name(part).ok_or_else(|| SqlError::Parse(format!("bad time_slot: {part}"))))
        .collect()
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.trim_matches(|c| c == '{' || c == '}')
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
