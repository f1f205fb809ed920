//! Result rows and mutation statistics handed back to the caller.

use serde::Serialize;

use crate::query::value::FieldData;

/// Counters reported in the summary row of a write statement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultStatistics {
    /// Vertices created.
    pub vertices_created: u64,
    /// Vertices deleted.
    pub vertices_deleted: u64,
    /// Edges created.
    pub edges_created: u64,
    /// Edges deleted.
    pub edges_deleted: u64,
    /// Properties set or removed.
    pub properties_set: u64,
}

impl ResultStatistics {
    /// Column names of the summary row.
    pub const HEADER: [&'static str; 5] = [
        "<SUMMARY>.vertices_created",
        "<SUMMARY>.vertices_deleted",
        "<SUMMARY>.edges_created",
        "<SUMMARY>.edges_deleted",
        "<SUMMARY>.properties_set",
    ];

    /// Summary row values in [`ResultStatistics::HEADER`] order.
    pub fn to_row(&self) -> Vec<FieldData> {
        [
            self.vertices_created,
            self.vertices_deleted,
            self.edges_created,
            self.edges_deleted,
            self.properties_set,
        ]
        .into_iter()
        .map(|v| FieldData::Int(v as i64))
        .collect()
    }

    /// True when the statement changed nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Header plus rows produced by the plan root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    /// Column names.
    pub header: Vec<String>,
    /// Rows in production order.
    pub rows: Vec<Vec<FieldData>>,
}

impl ResultSet {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were produced.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across all rows.
    pub fn column(&self, name: &str) -> Option<Vec<FieldData>> {
        let idx = self.header.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(FieldData::Null))
                .collect(),
        )
    }

    /// Rows as an array of JSON objects keyed by header.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .header
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_rows_are_keyed_by_header() {
        let set = ResultSet {
            header: vec!["name".into(), "age".into()],
            rows: vec![vec![FieldData::from("ann"), FieldData::Int(31)]],
        };
        assert_eq!(set.to_json(), serde_json::json!([{"name": "ann", "age": 31}]));
        assert_eq!(set.column("age"), Some(vec![FieldData::Int(31)]));
    }

    #[test]
    fn summary_row_follows_header_order() {
        let stats = ResultStatistics {
            vertices_created: 2,
            properties_set: 3,
            ..Default::default()
        };
        let row = stats.to_row();
        assert_eq!(row.len(), ResultStatistics::HEADER.len());
        assert_eq!(row[0], FieldData::Int(2));
        assert_eq!(row[4], FieldData::Int(3));
    }
}
