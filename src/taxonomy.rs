use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Nursery,
    Kg,
    Primary,
    Jhs,
    Class,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Nursery => "NURSERY",
            Level::Kg => "KG",
            Level::Primary => "PRIMARY",
            Level::Jhs => "JHS",
            Level::Class => "CLASS",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Explicit tier; when absent the id prefix decides.
    pub level: Option<Level>,
}

const fn class(id: &'static str, name: &'static str, level: Option<Level>) -> ClassDef {
    ClassDef { id, name, level }
}

const PREFIX_RULES: [(&str, Level); 4] = [
    ("c_n", Level::Nursery),
    ("c_kg", Level::Kg),
    ("c_p", Level::Primary),
    ("c_jhs", Level::Jhs),
];

const STANDARD_CLASSES: &[ClassDef] = &[
    class("c_creche", "Creche", Some(Level::Nursery)),
    class("c_n1", "Nursery 1", None),
    class("c_n2", "Nursery 2", None),
    class("c_pre_kg", "Pre-KG", Some(Level::Kg)),
    class("c_kg1", "KG 1", None),
    class("c_kg2", "KG 2", None),
    class("c_p1", "Basic 1", None),
    class("c_p2", "Basic 2", None),
    class("c_p3", "Basic 3", None),
    class("c_p4", "Basic 4", None),
    class("c_p5", "Basic 5", None),
    class("c_p6", "Basic 6", None),
    class("c_jhs1", "JHS 1", None),
    class("c_jhs2", "JHS 2", None),
    class("c_jhs3", "JHS 3", None),
];

/// Static reference table of class identifiers.
#[derive(Debug, Clone)]
pub struct ClassCatalog {
    classes: Vec<ClassDef>,
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ClassCatalog {
    pub fn standard() -> Self {
        Self::new(STANDARD_CLASSES.to_vec())
    }

    pub fn new(classes: Vec<ClassDef>) -> Self {
        Self { classes }
    }

    pub fn get(&self, class_id: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    /// Catalog level, then id prefix, then `CLASS`. Never fails.
    pub fn resolve(&self, class_id: &str) -> Level {
        if let Some(level) = self.get(class_id).and_then(|c| c.level) {
            return level;
        }
        level_from_prefix(class_id).unwrap_or(Level::Class)
    }

    pub fn display_name(&self, class_id: &str) -> String {
        if let Some(def) = self.get(class_id) {
            return def.name.to_string();
        }
        if class_id.trim().is_empty() {
            "Unassigned".to_string()
        } else {
            class_id.to_string()
        }
    }
}

fn level_from_prefix(class_id: &str) -> Option<Level> {
    PREFIX_RULES
        .iter()
        .find(|(prefix, _)| class_id.starts_with(prefix))
        .map(|(_, level)| *level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_map_to_levels() {
        let catalog = ClassCatalog::new(Vec::new());
        assert_eq!(catalog.resolve("c_n1"), Level::Nursery);
        assert_eq!(catalog.resolve("c_kg2"), Level::Kg);
        assert_eq!(catalog.resolve("c_p3"), Level::Primary);
        assert_eq!(catalog.resolve("c_jhs1"), Level::Jhs);
    }

    #[test]
    fn empty_and_unmatched_ids_fall_back_to_class() {
        let catalog = ClassCatalog::standard();
        assert_eq!(catalog.resolve(""), Level::Class);
        assert_eq!(catalog.resolve("shs_1"), Level::Class);
        assert_eq!(catalog.resolve("C_P1"), Level::Class);
        assert_eq!(Level::Class.label(), "CLASS");
    }

    #[test]
    fn catalog_level_overrides_prefix() {
        let catalog = ClassCatalog::standard();
        // `c_pre_kg` would be PRIMARY by prefix.
        assert_eq!(catalog.resolve("c_pre_kg"), Level::Kg);
        assert_eq!(catalog.resolve("c_creche"), Level::Nursery);
        assert_eq!(catalog.resolve("c_p3"), Level::Primary);
    }

    #[test]
    fn display_names_use_catalog_then_raw_id() {
        let catalog = ClassCatalog::standard();
        assert_eq!(catalog.display_name("c_p3"), "Basic 3");
        assert_eq!(catalog.display_name("c_p9"), "c_p9");
        assert_eq!(catalog.display_name(""), "Unassigned");
    }
}
