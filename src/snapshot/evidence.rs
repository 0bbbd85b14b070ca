//! Indexed, read-only view over a profile snapshot
//!
//! Lookups are case-insensitive on schema, table and column. When the profiler
//! reports the same object twice, the first report wins.

use crate::snapshot::{
    ColumnCoordinate, ColumnProfile, CompositeUniqueCandidateProfile, ForeignKeyReality,
    ProfileSnapshot, ProfilingCoverageAnomaly, UniqueCandidateProfile,
};
use std::collections::HashMap;

pub struct EvidenceIndex<'a> {
    columns: HashMap<String, &'a ColumnProfile>,
    unique: HashMap<String, &'a UniqueCandidateProfile>,
    composite: HashMap<String, &'a CompositeUniqueCandidateProfile>,
    foreign_keys: HashMap<String, &'a ForeignKeyReality>,
    column_anomalies: HashMap<String, &'a ProfilingCoverageAnomaly>,
    table_anomalies: HashMap<String, &'a ProfilingCoverageAnomaly>,
    unique_by_table: HashMap<String, Vec<&'a UniqueCandidateProfile>>,
    composite_by_table: HashMap<String, Vec<&'a CompositeUniqueCandidateProfile>>,
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table).to_ascii_lowercase()
}

/// Order-insensitive key for a column set
pub(crate) fn column_set_key(schema: &str, table: &str, columns: &[String]) -> String {
    let mut normalized: Vec<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    normalized.sort();
    normalized.dedup();
    format!("{}({})", table_key(schema, table), normalized.join(","))
}

impl<'a> EvidenceIndex<'a> {
    pub fn new(snapshot: &'a ProfileSnapshot) -> Self {
        let mut index = Self {
            columns: HashMap::new(),
            unique: HashMap::new(),
            composite: HashMap::new(),
            foreign_keys: HashMap::new(),
            column_anomalies: HashMap::new(),
            table_anomalies: HashMap::new(),
            unique_by_table: HashMap::new(),
            composite_by_table: HashMap::new(),
        };

        for column in &snapshot.columns {
            index.columns.entry(column.coordinate().key()).or_insert(column);
        }

        for candidate in &snapshot.unique_candidates {
            let key = ColumnCoordinate::new(&candidate.schema, &candidate.table, &candidate.column).key();
            if !index.unique.contains_key(&key) {
                index.unique.insert(key, candidate);
                index
                    .unique_by_table
                    .entry(table_key(&candidate.schema, &candidate.table))
                    .or_default()
                    .push(candidate);
            }
        }

        for candidate in &snapshot.composite_unique_candidates {
            let key = column_set_key(&candidate.schema, &candidate.table, &candidate.columns);
            if !index.composite.contains_key(&key) {
                index.composite.insert(key, candidate);
                index
                    .composite_by_table
                    .entry(table_key(&candidate.schema, &candidate.table))
                    .or_default()
                    .push(candidate);
            }
        }

        for reality in &snapshot.foreign_keys {
            index
                .foreign_keys
                .entry(reality.reference.source().key())
                .or_insert(reality);
        }

        for anomaly in &snapshot.anomalies {
            match &anomaly.column {
                Some(column) => {
                    let key = ColumnCoordinate::new(&anomaly.schema, &anomaly.table, column).key();
                    index.column_anomalies.entry(key).or_insert(anomaly);
                }
                None => {
                    index
                        .table_anomalies
                        .entry(table_key(&anomaly.schema, &anomaly.table))
                        .or_insert(anomaly);
                }
            }
        }

        index
    }

    pub fn column(&self, coordinate: &ColumnCoordinate) -> Option<&'a ColumnProfile> {
        self.columns.get(&coordinate.key()).copied()
    }

    pub fn unique(&self, coordinate: &ColumnCoordinate) -> Option<&'a UniqueCandidateProfile> {
        self.unique.get(&coordinate.key()).copied()
    }

    pub fn composite(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
    ) -> Option<&'a CompositeUniqueCandidateProfile> {
        self.composite.get(&column_set_key(schema, table, columns)).copied()
    }

    /// Single-column candidates for a table, in snapshot order
    pub fn unique_candidates_for(&self, schema: &str, table: &str) -> &[&'a UniqueCandidateProfile] {
        self.unique_by_table
            .get(&table_key(schema, table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Composite candidates for a table, in snapshot order
    pub fn composite_candidates_for(
        &self,
        schema: &str,
        table: &str,
    ) -> &[&'a CompositeUniqueCandidateProfile] {
        self.composite_by_table
            .get(&table_key(schema, table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn foreign_key(&self, source: &ColumnCoordinate) -> Option<&'a ForeignKeyReality> {
        self.foreign_keys.get(&source.key()).copied()
    }

    /// Column-level anomaly, falling back to a table-level one
    pub fn anomaly(&self, coordinate: &ColumnCoordinate) -> Option<&'a ProfilingCoverageAnomaly> {
        self.column_anomalies
            .get(&coordinate.key())
            .or_else(|| self.table_anomalies.get(&table_key(&coordinate.schema, &coordinate.table)))
            .copied()
    }
}
