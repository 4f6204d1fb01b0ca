//! SQLite-backed data source generated from a descriptor tree
//!
//! Each table is read with one flat `SELECT`; lookup labels come from
//! correlated sub-selects and grid rows are fetched lazily, one `SELECT` per
//! parent row, the first time a grid observes them.

mod builder;
mod field;

pub use builder::{validate_identifier, SqlTable, TABLE_ALIAS};
pub use field::{SqlField, DISPLAY_SUFFIX};

use std::sync::{Arc, Mutex, OnceLock};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Transaction};
use tracing::{debug, trace};

use super::{ModelDataSource, ModelDataSourceFactory, ModelDataSourceQuery, SaveResult};
use crate::core::cipher::{FieldCipher, PlainText};
use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::{ModelError, Result};
use crate::core::value::{PropertyValues, RowSet, Value};

/// Connection shared by every data source of a process
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Create all tables a window needs, if they do not exist yet
pub fn create_tables(conn: &Connection, descriptor: &PropertyDescriptor) -> Result<()> {
    let table = SqlTable::from_root(descriptor)?;
    for statement in table.create_statements() {
        debug!("Executing: {}", statement);
        conn.execute_batch(&statement)
            .map_err(|source| ModelError::Query {
                sql: statement.clone(),
                params: Vec::new(),
                source,
            })?;
    }
    Ok(())
}

/// Reads and writes the records of one window
pub struct SqlModelDataSource {
    table: Arc<SqlTable>,
    conn: SharedConnection,
    cipher: Arc<dyn FieldCipher>,
    records: OnceLock<Vec<PropertyValues>>,
}

impl SqlModelDataSource {
    pub fn new(descriptor: &PropertyDescriptor, conn: SharedConnection) -> Result<Self> {
        Self::with_cipher(descriptor, conn, Arc::new(PlainText))
    }

    pub fn with_cipher(
        descriptor: &PropertyDescriptor,
        conn: SharedConnection,
        cipher: Arc<dyn FieldCipher>,
    ) -> Result<Self> {
        let table = SqlTable::from_root(descriptor)?;
        debug!("SQL data source for {}: {}", table.name, table.select());
        Ok(Self {
            table,
            conn,
            cipher,
            records: OnceLock::new(),
        })
    }

    pub fn table(&self) -> &Arc<SqlTable> {
        &self.table
    }

    /// The complete statement for a query and its parameters
    pub fn build_sql(&self, query: &ModelDataSourceQuery) -> (String, Vec<SqlValue>) {
        build_sql(&self.table, query)
    }

    fn reader(&self) -> Reader {
        Reader {
            table: Arc::clone(&self.table),
            conn: Arc::clone(&self.conn),
            cipher: Arc::clone(&self.cipher),
        }
    }

    /// The base record list, queried on first use
    fn records(&self) -> Result<&Vec<PropertyValues>> {
        if let Some(records) = self.records.get() {
            return Ok(records);
        }
        let records = self.reader().retrieve(&ModelDataSourceQuery::All)?;
        debug!("Loaded {} records from {}", records.len(), self.table.name);
        Ok(self.records.get_or_init(|| records))
    }

    fn records_mut(&mut self) -> Result<&mut Vec<PropertyValues>> {
        self.records()?;
        self.records
            .get_mut()
            .ok_or_else(|| ModelError::IllegalState("record list not loaded".to_string()))
    }
}

impl std::fmt::Debug for SqlModelDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlModelDataSource")
            .field("table", &self.table.name)
            .field("loaded", &self.records.get().map(Vec::len))
            .finish()
    }
}

impl ModelDataSource for SqlModelDataSource {
    fn records_count(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    fn record(&self, index: usize) -> Result<PropertyValues> {
        self.records()?
            .get(index)
            .cloned()
            .ok_or(ModelError::InvalidRecordIndex(index))
    }

    fn retrieve_supplier(&self, query: ModelDataSourceQuery) -> RowSet {
        let reader = self.reader();
        RowSet::deferred(move || reader.retrieve(&query))
    }

    fn save_record(&mut self, index: Option<usize>, values: &PropertyValues) -> Result<SaveResult> {
        // Deferred grid rows read through the connection, so resolve them
        // before the lock is taken.
        let values = materialize(values)?;
        let record_count = self.records()?.len();
        if let Some(index) = index {
            if index >= record_count {
                return Err(ModelError::InvalidRecordIndex(index));
            }
        }

        let record_id = {
            let mut conn = self.conn.lock().map_err(|_| ModelError::ConnectionPoisoned)?;
            let tx = conn.transaction()?;
            let id = write_row(&tx, &self.table, self.cipher.as_ref(), &values, None)?;
            tx.commit()?;
            id
        };

        let saved = self
            .reader()
            .retrieve_single(&ModelDataSourceQuery::RecordId(record_id.clone()))?
            .ok_or_else(|| ModelError::RecordNotFound(record_id.to_string()))?;

        let records = self.records_mut()?;
        let record_index = match index {
            Some(index) => {
                records[index] = saved;
                index
            }
            None => {
                records.push(saved);
                records.len() - 1
            }
        };
        debug!("Saved {} record {} at index {}", self.table.name, record_id, record_index);

        Ok(SaveResult {
            record_index,
            record_id,
        })
    }

    fn retrieve_record_by_id(&self, id: &Value) -> Result<Option<PropertyValues>> {
        self.reader()
            .retrieve_single(&ModelDataSourceQuery::RecordId(id.clone()))
    }
}

/// Everything a deferred row set needs to run its query later
#[derive(Clone)]
struct Reader {
    table: Arc<SqlTable>,
    conn: SharedConnection,
    cipher: Arc<dyn FieldCipher>,
}

impl Reader {
    fn retrieve(&self, query: &ModelDataSourceQuery) -> Result<Vec<PropertyValues>> {
        let (sql, params) = build_sql(&self.table, query);
        let described: Vec<String> = params.iter().map(field::describe).collect();
        trace!("Retrieving records: SQL={} -- {:?}", sql, described);

        let width = self.table.width();
        let raw_rows: Vec<Vec<SqlValue>> = {
            let conn = self.conn.lock().map_err(|_| ModelError::ConnectionPoisoned)?;
            let wrap = |source: rusqlite::Error| ModelError::Query {
                sql: sql.clone(),
                params: described.clone(),
                source,
            };
            let mut stmt = conn.prepare(&sql).map_err(wrap)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    (0..width).map(|idx| row.get::<_, SqlValue>(idx)).collect()
                })
                .map_err(wrap)?;
            let collected: Vec<Vec<SqlValue>> =
                rows.collect::<rusqlite::Result<_>>().map_err(wrap)?;
            collected
        };

        raw_rows.iter().map(|raw| self.decode_row(raw)).collect()
    }

    fn retrieve_single(&self, query: &ModelDataSourceQuery) -> Result<Option<PropertyValues>> {
        let mut records = self.retrieve(query)?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            _ => Err(ModelError::MultipleResultsFound {
                query: format!("{} in {}", query, self.table.name),
            }),
        }
    }

    fn decode_row(&self, raw: &[SqlValue]) -> Result<PropertyValues> {
        let mut values = PropertyValues::with_capacity(self.table.fields.len());
        let mut key_value = Value::Null;
        let mut offset = 0;
        for field in &self.table.fields {
            let width = field.width();
            let value = field.decode(&raw[offset..offset + width], self.cipher.as_ref())?;
            offset += width;
            if field.key {
                key_value = value.clone();
            }
            values.insert(field.property.clone(), value);
        }

        for (grid, child) in &self.table.children {
            let reader = Reader {
                table: Arc::clone(child),
                conn: Arc::clone(&self.conn),
                cipher: Arc::clone(&self.cipher),
            };
            let query = ModelDataSourceQuery::ParentLinkId(key_value.clone());
            values.insert(
                grid.clone(),
                Value::Rows(RowSet::deferred(move || reader.retrieve(&query))),
            );
        }
        Ok(values)
    }
}

fn build_sql(table: &SqlTable, query: &ModelDataSourceQuery) -> (String, Vec<SqlValue>) {
    let mut sql = table.select().to_string();
    let mut params = Vec::new();
    let filter = match query {
        ModelDataSourceQuery::All => None,
        ModelDataSourceQuery::RecordId(id) => Some((table.key(), id)),
        ModelDataSourceQuery::ParentLinkId(id) => table.parent_link().map(|f| (f, id)),
    };
    if let Some((field, id)) = filter {
        sql.push_str(&format!(" WHERE {}.{} = ?1", TABLE_ALIAS, field.column));
        params.push(key_param(id));
    }
    sql.push_str(&format!(" ORDER BY {}.{}", TABLE_ALIAS, table.key().column));
    (sql, params)
}

fn key_param(id: &Value) -> SqlValue {
    match id.clone().unwrap_lookup() {
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Null => SqlValue::Null,
        other => SqlValue::Text(other.to_string()),
    }
}

/// Resolve every nested row set into loaded rows
fn materialize(values: &PropertyValues) -> Result<PropertyValues> {
    let mut materialized = PropertyValues::with_capacity(values.len());
    for (name, value) in values {
        let value = match value {
            Value::Rows(rows) => Value::Rows(RowSet::loaded(
                rows.rows()?.iter().map(materialize).collect::<Result<_>>()?,
            )),
            other => other.clone(),
        };
        materialized.insert(name.clone(), value);
    }
    Ok(materialized)
}

/// Insert or update one row, then synchronize its grids; returns the key
fn write_row(
    tx: &Transaction<'_>,
    table: &SqlTable,
    cipher: &dyn FieldCipher,
    values: &PropertyValues,
    parent_id: Option<&Value>,
) -> Result<Value> {
    let key_field = table.key();
    let key_value = values
        .get(&key_field.property)
        .cloned()
        .unwrap_or_default()
        .unwrap_lookup();

    let mut columns = Vec::new();
    let mut params = Vec::new();
    for field in &table.fields {
        if field.key {
            continue;
        }
        let value = match (field.parent_link, parent_id) {
            (true, Some(parent_id)) => parent_id.clone(),
            _ => match values.get(&field.property) {
                Some(value) => value.clone(),
                None => continue,
            },
        };
        columns.push(field.column.as_str());
        params.push(field.encode(&value, cipher)?);
    }

    // Child rows are only updated under their own parent
    let parent_scope = parent_id.and_then(|id| table.parent_link().map(|link| (link, id)));

    let mut updated = 0;
    if !key_value.is_null() {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| format!("{} = ?{}", column, idx + 1))
            .collect();
        if assignments.is_empty() {
            updated = count_matching(tx, table, &key_value)?;
        } else {
            let mut sql = format!(
                "UPDATE {} SET {} WHERE {} = ?{}",
                table.name,
                assignments.join(", "),
                key_field.column,
                columns.len() + 1
            );
            let mut all_params = params.clone();
            all_params.push(key_field.encode(&key_value, cipher)?);
            if let Some((link, parent_id)) = parent_scope {
                sql.push_str(&format!(" AND {} = ?{}", link.column, all_params.len() + 1));
                all_params.push(link.encode(parent_id, cipher)?);
            }
            updated = execute(tx, &sql, &all_params)?;
        }

        if updated == 0 && parent_scope.is_some() && count_matching(tx, table, &key_value)? > 0 {
            return Err(ModelError::IllegalState(format!(
                "row {} of {} belongs to another parent",
                key_value, table.name
            )));
        }
    }

    let record_id = if updated > 0 {
        key_value
    } else {
        let mut insert_columns = columns.clone();
        let mut insert_params = params;
        if !key_value.is_null() {
            insert_columns.push(key_field.column.as_str());
            insert_params.push(key_field.encode(&key_value, cipher)?);
        }
        let sql = if insert_columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table.name)
        } else {
            let placeholders: Vec<String> =
                (1..=insert_columns.len()).map(|idx| format!("?{}", idx)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name,
                insert_columns.join(", "),
                placeholders.join(", ")
            )
        };
        execute(tx, &sql, &insert_params)?;
        if key_value.is_null() {
            Value::Integer(tx.last_insert_rowid())
        } else {
            key_value
        }
    };

    for (grid, child) in &table.children {
        if let Some(Value::Rows(rows)) = values.get(grid) {
            sync_rows(tx, child, cipher, rows.rows()?, &record_id)?;
        }
    }

    Ok(record_id)
}

/// Upsert the present child rows and delete persisted rows no longer present
fn sync_rows(
    tx: &Transaction<'_>,
    table: &SqlTable,
    cipher: &dyn FieldCipher,
    rows: &[PropertyValues],
    parent_id: &Value,
) -> Result<()> {
    let Some(parent_link) = table.parent_link() else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let id = write_row(tx, table, cipher, row, Some(parent_id))?;
        kept.push(table.key().encode(&id, cipher)?);
    }

    let mut params = vec![parent_link.encode(parent_id, cipher)?];
    let mut sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        table.name, parent_link.column
    );
    if !kept.is_empty() {
        let placeholders: Vec<String> =
            (2..kept.len() + 2).map(|idx| format!("?{}", idx)).collect();
        sql.push_str(&format!(
            " AND {} NOT IN ({})",
            table.key().column,
            placeholders.join(", ")
        ));
        params.extend(kept);
    }
    let removed = execute(tx, &sql, &params)?;
    if removed > 0 {
        debug!("Removed {} rows from {}", removed, table.name);
    }
    Ok(())
}

fn count_matching(tx: &Transaction<'_>, table: &SqlTable, key: &Value) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1",
        table.name,
        table.key().column
    );
    let param = key_param(key);
    tx.query_row(&sql, [&param], |row| row.get::<_, i64>(0))
        .map(|count| count as usize)
        .map_err(|source| ModelError::Query {
            sql,
            params: vec![field::describe(&param)],
            source,
        })
}

fn execute(tx: &Transaction<'_>, sql: &str, params: &[SqlValue]) -> Result<usize> {
    let described: Vec<String> = params.iter().map(field::describe).collect();
    trace!("Executing: {} -- {:?}", sql, described);
    tx.execute(sql, params_from_iter(params.iter()))
        .map_err(|source| ModelError::Query {
            sql: sql.to_string(),
            params: described,
            source,
        })
}

/// Creates [`SqlModelDataSource`]s over one shared connection
#[derive(Clone)]
pub struct SqlDataSourceFactory {
    conn: SharedConnection,
    cipher: Arc<dyn FieldCipher>,
}

impl SqlDataSourceFactory {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            cipher: Arc::new(PlainText),
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn FieldCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Open a database file and wrap it in a factory
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.conn
    }
}

impl ModelDataSourceFactory for SqlDataSourceFactory {
    fn create(&self, descriptor: &Arc<PropertyDescriptor>) -> Result<Box<dyn ModelDataSource>> {
        Ok(Box::new(SqlModelDataSource::with_cipher(
            descriptor,
            Arc::clone(&self.conn),
            Arc::clone(&self.cipher),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::ColumnBinding;
    use crate::core::value::{LookupValue, ValueType};
    use rust_decimal::Decimal;

    fn order() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::group("Order")
            .table("c_order")
            .child(
                PropertyDescriptor::value("OrderId", ValueType::Identifier)
                    .column(ColumnBinding::new("c_order_id").key())
                    .build(),
            )
            .child(
                PropertyDescriptor::value("DocumentNo", ValueType::Text)
                    .column(ColumnBinding::new("documentno"))
                    .build(),
            )
            .child(
                PropertyDescriptor::value("Partner", ValueType::Lookup)
                    .column(ColumnBinding::new("c_bpartner_id").lookup(
                        "c_bpartner",
                        "c_bpartner_id",
                        "name",
                    ))
                    .build(),
            )
            .child(
                PropertyDescriptor::value("IsApproved", ValueType::YesNo)
                    .column(ColumnBinding::new("isapproved"))
                    .build(),
            )
            .child(
                PropertyDescriptor::grid("Lines", "c_orderline")
                    .child(
                        PropertyDescriptor::value("LineId", ValueType::Identifier)
                            .column(ColumnBinding::new("c_orderline_id").key())
                            .build(),
                    )
                    .child(
                        PropertyDescriptor::value("OrderRef", ValueType::Identifier)
                            .column(ColumnBinding::new("c_order_id").parent_link())
                            .build(),
                    )
                    .child(
                        PropertyDescriptor::value("Qty", ValueType::Decimal)
                            .column(ColumnBinding::new("qty"))
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    fn setup() -> (SharedConnection, SqlModelDataSource) {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn, &order()).unwrap();
        conn.execute_batch(
            "INSERT INTO c_bpartner (c_bpartner_id, name) VALUES (1, 'Acme'), (2, 'Globex');
             INSERT INTO c_order (c_order_id, documentno, c_bpartner_id, isapproved) VALUES (10, 'SO-10', 1, 'Y');
             INSERT INTO c_order (c_order_id, documentno, c_bpartner_id, isapproved) VALUES (20, 'SO-20', 2, 'N');
             INSERT INTO c_orderline (c_orderline_id, c_order_id, qty) VALUES (100, 10, '2'), (101, 10, '3.5');",
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let ds = SqlModelDataSource::new(&order(), Arc::clone(&conn)).unwrap();
        (conn, ds)
    }

    fn order_values(documentno: &str) -> PropertyValues {
        let mut values = PropertyValues::new();
        values.insert("DocumentNo".into(), Value::text(documentno));
        values.insert("Partner".into(), Value::Lookup(LookupValue::of_id(2, "")));
        values.insert("IsApproved".into(), Value::Boolean(true));
        values
    }

    fn line(id: Option<i64>, qty: &str) -> PropertyValues {
        let mut row = PropertyValues::new();
        row.insert("LineId".into(), Value::from(id));
        row.insert("Qty".into(), Value::decimal(qty).unwrap());
        row
    }

    #[test]
    fn test_build_sql_filters() {
        let (_, ds) = setup();
        let (sql, params) = ds.build_sql(&ModelDataSourceQuery::RecordId(Value::Integer(10)));
        assert!(sql.ends_with("FROM c_order t WHERE t.c_order_id = ?1 ORDER BY t.c_order_id"));
        assert_eq!(params, vec![SqlValue::Integer(10)]);

        let (sql, params) = ds.build_sql(&ModelDataSourceQuery::All);
        assert!(sql.ends_with("FROM c_order t ORDER BY t.c_order_id"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_records_are_decoded() {
        let (_, ds) = setup();
        assert_eq!(ds.records_count().unwrap(), 2);

        let first = ds.record(0).unwrap();
        assert_eq!(first["OrderId"], Value::Integer(10));
        assert_eq!(first["DocumentNo"], Value::text("SO-10"));
        assert_eq!(first["Partner"], Value::Lookup(LookupValue::of_id(1, "Acme")));
        assert_eq!(first["IsApproved"], Value::Boolean(true));

        let lines = first["Lines"].as_rows().unwrap();
        assert!(!lines.is_loaded());
        let rows = lines.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["Qty"].as_decimal(), Some(Decimal::new(35, 1)));
        assert_eq!(rows[1]["OrderRef"], Value::Integer(10));
    }

    #[test]
    fn test_out_of_range_record() {
        let (_, ds) = setup();
        assert!(matches!(
            ds.record(5).unwrap_err(),
            ModelError::InvalidRecordIndex(5)
        ));
    }

    #[test]
    fn test_save_new_record_appends_and_reloads() {
        let (_, mut ds) = setup();
        let mut values = order_values("SO-30");
        values.insert(
            "Lines".into(),
            Value::Rows(RowSet::loaded(vec![line(None, "4")])),
        );

        let saved = ds.save_record(None, &values).unwrap();
        assert_eq!(saved.record_index, 2);
        assert_eq!(ds.records_count().unwrap(), 3);

        let reloaded = ds.record(2).unwrap();
        assert_eq!(reloaded["OrderId"], saved.record_id);
        assert_eq!(reloaded["Partner"], Value::Lookup(LookupValue::of_id(2, "Globex")));
        let rows = reloaded["Lines"].as_rows().unwrap().rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["OrderRef"], saved.record_id);
    }

    #[test]
    fn test_save_existing_record_updates_and_syncs_lines() {
        let (conn, mut ds) = setup();
        let mut values = ds.record(0).unwrap();
        values.insert("DocumentNo".into(), Value::text("SO-10b"));
        values.insert(
            "Lines".into(),
            Value::Rows(RowSet::loaded(vec![line(Some(100), "7"), line(None, "1")])),
        );

        let saved = ds.save_record(Some(0), &values).unwrap();
        assert_eq!(saved.record_index, 0);
        assert_eq!(saved.record_id, Value::Integer(10));
        assert_eq!(ds.records_count().unwrap(), 2);
        assert_eq!(ds.record(0).unwrap()["DocumentNo"], Value::text("SO-10b"));

        let conn = conn.lock().unwrap();
        let ids: Vec<i64> = conn
            .prepare("SELECT c_orderline_id FROM c_orderline WHERE c_order_id = 10 ORDER BY 1")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], 100);
        assert!(!ids.contains(&101));
    }

    #[test]
    fn test_line_of_another_order_is_rejected() {
        let (conn, mut ds) = setup();
        let mut values = ds.record(1).unwrap();
        values.insert(
            "Lines".into(),
            Value::Rows(RowSet::loaded(vec![line(Some(100), "9")])),
        );

        let err = ds.save_record(Some(1), &values).unwrap_err();
        assert!(matches!(err, ModelError::IllegalState(_)));

        let conn = conn.lock().unwrap();
        let (owner, qty): (i64, String) = conn
            .query_row(
                "SELECT c_order_id, qty FROM c_orderline WHERE c_orderline_id = 100",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(owner, 10);
        assert_eq!(qty, "2");
    }

    #[test]
    fn test_retrieve_supplier_is_deferred() {
        let (conn, ds) = setup();
        let supplier = ds.retrieve_supplier(ModelDataSourceQuery::RecordId(Value::Integer(20)));
        assert!(!supplier.is_loaded());
        conn.lock()
            .unwrap()
            .execute_batch("UPDATE c_order SET documentno = 'SO-20b' WHERE c_order_id = 20")
            .unwrap();

        let rows = supplier.rows().unwrap();
        assert!(supplier.is_loaded());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["DocumentNo"], Value::text("SO-20b"));
    }

    #[test]
    fn test_retrieve_record_by_id() {
        let (_, ds) = setup();
        let found = ds.retrieve_record_by_id(&Value::Integer(20)).unwrap().unwrap();
        assert_eq!(found["DocumentNo"], Value::text("SO-20"));
        assert!(ds.retrieve_record_by_id(&Value::Integer(99)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_text_keys_are_ambiguous() {
        let tags = PropertyDescriptor::group("Tag")
            .table("c_tag")
            .child(
                PropertyDescriptor::value("Code", ValueType::Text)
                    .column(ColumnBinding::new("code").key())
                    .build(),
            )
            .child(
                PropertyDescriptor::value("Name", ValueType::Text)
                    .column(ColumnBinding::new("name"))
                    .build(),
            )
            .build();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE c_tag (code TEXT, name TEXT);
             INSERT INTO c_tag (code, name) VALUES ('RUSH', 'Rush'), ('RUSH', 'Urgent'), ('HOLD', 'Hold');",
        )
        .unwrap();
        let ds = SqlModelDataSource::new(&tags, Arc::new(Mutex::new(conn))).unwrap();

        assert!(matches!(
            ds.retrieve_record_by_id(&Value::text("RUSH")).unwrap_err(),
            ModelError::MultipleResultsFound { .. }
        ));
        let hold = ds.retrieve_record_by_id(&Value::text("HOLD")).unwrap().unwrap();
        assert_eq!(hold["Name"], Value::text("Hold"));
    }

    #[test]
    fn test_query_errors_carry_sql() {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let ds = SqlModelDataSource::new(&order(), conn).unwrap();
        match ds.records_count().unwrap_err() {
            ModelError::Query { sql, .. } => assert!(sql.starts_with("SELECT t.c_order_id")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
