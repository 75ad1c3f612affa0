//! Vocabulary drift: new or vanished variable names and new value names.

use indexmap::IndexSet;
use serde::Serialize;

use crate::models::HistoricalSummary;

/// A batch column name, split on its first underscore.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnName<'a> {
    /// Plain field, e.g. `Price`.
    Variable(&'a str),
    /// Pseudo-categorical field, e.g. `Ypatybes_Balkonas`.
    Value { variable: &'a str, value: &'a str },
}

impl<'a> ColumnName<'a> {
    pub fn parse(name: &'a str) -> Self {
        match name.split_once('_') {
            Some((variable, value)) => ColumnName::Value { variable, value },
            None => ColumnName::Variable(name),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NameReport {
    /// Known variables absent from this batch. Value names are never
    /// checked for absence since they vary day to day.
    pub missing_variables: Vec<String>,
    pub new_variables: Vec<String>,
    pub new_values: Vec<String>,
}

impl NameReport {
    pub fn has_drift(&self) -> bool {
        !(self.missing_variables.is_empty()
            && self.new_variables.is_empty()
            && self.new_values.is_empty())
    }
}

/// Compare batch column names with the known vocabulary and add every new
/// name to it. Nothing is ever removed.
pub fn check_names<'a>(
    summary: &mut HistoricalSummary,
    columns: impl IntoIterator<Item = &'a String>,
) -> NameReport {
    let mut variables: IndexSet<&str> = IndexSet::new();
    let mut values: IndexSet<&str> = IndexSet::new();
    for name in columns {
        match ColumnName::parse(name) {
            ColumnName::Variable(variable) => {
                variables.insert(variable);
            }
            ColumnName::Value { value, .. } => {
                values.insert(value);
            }
        }
    }

    let missing_variables = summary
        .known_variable_names
        .iter()
        .filter(|name| !variables.contains(name.as_str()))
        .cloned()
        .collect();

    let new_variables: Vec<String> = variables
        .iter()
        .filter(|name| !summary.known_variable_names.contains(**name))
        .map(|name| name.to_string())
        .collect();
    let new_values: Vec<String> = values
        .iter()
        .filter(|name| !summary.known_value_names.contains(**name))
        .map(|name| name.to_string())
        .collect();

    summary
        .known_variable_names
        .extend(new_variables.iter().cloned());
    summary.known_value_names.extend(new_values.iter().cloned());

    NameReport {
        missing_variables,
        new_variables,
        new_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_column_name() {
        assert_eq!(ColumnName::parse("Price"), ColumnName::Variable("Price"));
        assert_eq!(
            ColumnName::parse("Ypatybes_Balkonas"),
            ColumnName::Value {
                variable: "Ypatybes",
                value: "Balkonas"
            }
        );
        assert_eq!(
            ColumnName::parse("A_B_C"),
            ColumnName::Value {
                variable: "A",
                value: "B_C"
            }
        );
    }

    #[test]
    fn test_first_run_reports_everything_new() {
        let mut summary = HistoricalSummary::default();
        let columns = names(&["Price", "City", "Ypatybes_Balkonas", "Apsauga_Signalizacija"]);
        let report = check_names(&mut summary, &columns);
        assert!(report.missing_variables.is_empty());
        assert_eq!(report.new_variables, names(&["Price", "City"]));
        assert_eq!(report.new_values, names(&["Balkonas", "Signalizacija"]));
        assert!(summary.known_variable_names.contains("Price"));
        assert!(summary.known_value_names.contains("Balkonas"));
    }

    #[test]
    fn test_second_identical_call_finds_nothing_new() {
        let mut summary = HistoricalSummary::default();
        let columns = names(&["Price", "Ypatybes_Balkonas"]);
        check_names(&mut summary, &columns);
        let before = summary.clone();
        let report = check_names(&mut summary, &columns);
        assert!(!report.has_drift());
        assert_eq!(summary, before);
    }

    #[test]
    fn test_missing_variables_are_reported_but_kept() {
        let mut summary = HistoricalSummary::default();
        check_names(&mut summary, &names(&["Price", "Rooms", "Ypatybes_Balkonas"]));

        let report = check_names(&mut summary, &names(&["Price", "Floor"]));
        assert_eq!(report.missing_variables, names(&["Rooms"]));
        assert_eq!(report.new_variables, names(&["Floor"]));
        // Absent value names are not reported.
        assert!(report.new_values.is_empty());
        let known: Vec<&str> = summary
            .known_variable_names
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(known, vec!["Price", "Rooms", "Floor"]);
        assert!(summary.known_value_names.contains("Balkonas"));
    }

    #[test]
    fn test_shared_value_name_counted_once() {
        let mut summary = HistoricalSummary::default();
        let report = check_names(&mut summary, &names(&["A_Yes", "B_Yes"]));
        assert_eq!(report.new_values, names(&["Yes"]));
        assert_eq!(summary.known_value_names.len(), 1);
    }
}
