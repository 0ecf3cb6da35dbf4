//! Table layout of each object family in the repository.

use crate::models::ObjectClass;

/// Where one object class lives in the repository.
///
/// Every family has a description table keyed by `(database_id, name)`.
/// Tables keep their schema on the description row and have no information
/// table; every other family stores definition and timestamps in a 1:1
/// information row keyed by the description id.
#[derive(Debug)]
pub(crate) struct Family {
    pub(crate) description_table: &'static str,
    pub(crate) name_column: &'static str,
    pub(crate) information_table: Option<&'static str>,
    pub(crate) parent_column: &'static str,
    pub(crate) child_tables: &'static [&'static str],
}

const TABLES: Family = Family {
    description_table: "table_description",
    name_column: "table_name",
    information_table: None,
    parent_column: "table_id",
    child_tables: &["table_structure", "table_index", "table_relation"],
};

const VIEWS: Family = Family {
    description_table: "view_description",
    name_column: "view_name",
    information_table: Some("view_information"),
    parent_column: "view_id",
    child_tables: &["view_column"],
};

const FUNCTIONS: Family = Family {
    description_table: "function_description",
    name_column: "function_name",
    information_table: Some("func_information"),
    parent_column: "function_id",
    child_tables: &["func_parameter"],
};

const PROCEDURES: Family = Family {
    description_table: "ps_description",
    name_column: "procedure_name",
    information_table: Some("ps_information"),
    parent_column: "procedure_id",
    child_tables: &["ps_parameter"],
};

const TRIGGERS: Family = Family {
    description_table: "trigger_description",
    name_column: "trigger_name",
    information_table: Some("trigger_information"),
    parent_column: "trigger_id",
    child_tables: &[],
};

impl Family {
    pub(crate) fn of(class: ObjectClass) -> &'static Family {
        match class {
            ObjectClass::Tables => &TABLES,
            ObjectClass::Views => &VIEWS,
            ObjectClass::Functions => &FUNCTIONS,
            ObjectClass::Procedures => &PROCEDURES,
            ObjectClass::Triggers => &TRIGGERS,
        }
    }

    /// Column-bearing child table, if the family has one.
    pub(crate) fn column_table(&self) -> Option<&'static str> {
        match self.description_table {
            "table_description" => Some("table_structure"),
            "view_description" => Some("view_column"),
            _ => None,
        }
    }

    /// Parameter child table, if the family has one.
    pub(crate) fn parameter_table(&self) -> Option<&'static str> {
        match self.description_table {
            "function_description" => Some("func_parameter"),
            "ps_description" => Some("ps_parameter"),
            _ => None,
        }
    }

    /// Tables whose rows hang off a description id and must never outlive it.
    pub(crate) fn dependent_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.information_table
            .into_iter()
            .chain(self.child_tables.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_class_has_a_family() {
        for class in ObjectClass::ALL {
            let family = Family::of(class);
            assert!(family.description_table.ends_with("_description"));
        }
    }

    #[test]
    fn test_child_tables() {
        assert_eq!(Family::of(ObjectClass::Tables).column_table(), Some("table_structure"));
        assert_eq!(Family::of(ObjectClass::Views).column_table(), Some("view_column"));
        assert_eq!(Family::of(ObjectClass::Procedures).parameter_table(), Some("ps_parameter"));
        assert!(Family::of(ObjectClass::Triggers).child_tables.is_empty());
        assert_eq!(
            Family::of(ObjectClass::Functions).dependent_tables().collect::<Vec<_>>(),
            vec!["func_information", "func_parameter"]
        );
    }
}
