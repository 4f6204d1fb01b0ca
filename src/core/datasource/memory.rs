//! In-memory data source

use tracing::debug;

use super::{ModelDataSource, ModelDataSourceQuery, SaveResult};
use crate::core::error::{ModelError, Result};
use crate::core::value::{PropertyName, PropertyValues, RowSet, Value};

/// Records kept in a vector; keys are assigned from a counter
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    key: PropertyName,
    parent_link: Option<PropertyName>,
    records: Vec<PropertyValues>,
    next_id: i64,
}

impl MemoryDataSource {
    /// An empty source whose records are identified by the `key` property
    pub fn new(key: impl Into<PropertyName>) -> Self {
        Self {
            key: key.into(),
            parent_link: None,
            records: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_parent_link(mut self, parent_link: impl Into<PropertyName>) -> Self {
        self.parent_link = Some(parent_link.into());
        self
    }

    /// Add a record as if it had been loaded; a missing key is assigned
    pub fn with_record(mut self, mut values: PropertyValues) -> Self {
        self.assign_key(&mut values);
        self.records.push(values);
        self
    }

    pub fn records(&self) -> &[PropertyValues] {
        &self.records
    }

    fn key_of<'a>(&self, values: &'a PropertyValues) -> Option<&'a Value> {
        values.get(&self.key).filter(|v| !v.is_null())
    }

    fn assign_key(&mut self, values: &mut PropertyValues) -> Value {
        if let Some(existing) = self.key_of(values).cloned() {
            if let Some(id) = existing.as_i64() {
                self.next_id = self.next_id.max(id + 1);
            }
            return existing;
        }
        let id = Value::Integer(self.next_id);
        self.next_id += 1;
        values.insert(self.key.clone(), id.clone());
        id
    }

    fn matching(&self, query: &ModelDataSourceQuery) -> Vec<PropertyValues> {
        filter_records(&self.records, &self.key, self.parent_link.as_ref(), query)
    }
}

fn filter_records(
    records: &[PropertyValues],
    key: &PropertyName,
    parent_link: Option<&PropertyName>,
    query: &ModelDataSourceQuery,
) -> Vec<PropertyValues> {
    let (column, id) = match query {
        ModelDataSourceQuery::All => return records.to_vec(),
        ModelDataSourceQuery::RecordId(id) => (Some(key), id),
        ModelDataSourceQuery::ParentLinkId(id) => (parent_link, id),
    };
    let Some(column) = column else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|record| record.get(column) == Some(id))
        .cloned()
        .collect()
}

/// Force nested row sets so stored records never point back into a loader
fn materialize(values: &PropertyValues) -> Result<PropertyValues> {
    let mut materialized = PropertyValues::with_capacity(values.len());
    for (name, value) in values {
        let value = match value {
            Value::Rows(rows) => {
                let rows = rows
                    .rows()?
                    .iter()
                    .map(materialize)
                    .collect::<Result<Vec<_>>>()?;
                Value::Rows(RowSet::loaded(rows))
            }
            other => other.clone(),
        };
        materialized.insert(name.clone(), value);
    }
    Ok(materialized)
}

impl ModelDataSource for MemoryDataSource {
    fn records_count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn record(&self, index: usize) -> Result<PropertyValues> {
        self.records
            .get(index)
            .cloned()
            .ok_or(ModelError::InvalidRecordIndex(index))
    }

    /// Filters a snapshot of the current records when the rows are first read
    fn retrieve_supplier(&self, query: ModelDataSourceQuery) -> RowSet {
        let records = self.records.clone();
        let key = self.key.clone();
        let parent_link = self.parent_link.clone();
        RowSet::deferred(move || {
            debug!("Retrieving {} from memory", query);
            Ok(filter_records(&records, &key, parent_link.as_ref(), &query))
        })
    }

    fn save_record(&mut self, index: Option<usize>, values: &PropertyValues) -> Result<SaveResult> {
        let mut values = materialize(values)?;
        let record_id = self.assign_key(&mut values);

        let record_index = match index {
            Some(index) => {
                let slot = self
                    .records
                    .get_mut(index)
                    .ok_or(ModelError::InvalidRecordIndex(index))?;
                *slot = values;
                index
            }
            None => {
                self.records.push(values);
                self.records.len() - 1
            }
        };
        debug!("Saved record {} at index {}", record_id, record_index);

        Ok(SaveResult {
            record_index,
            record_id,
        })
    }

    fn retrieve_record_by_id(&self, id: &Value) -> Result<Option<PropertyValues>> {
        let query = ModelDataSourceQuery::RecordId(id.clone());
        let mut found = self.matching(&query);
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(ModelError::MultipleResultsFound {
                query: query.to_string(),
            }),
        }
    }
}
