//! Character substitution used to reconcile dataset names with on-disk names
//! that instrument operators edited by hand.

use serde::{Deserialize, Serialize};

/// Ordered single-character substitutions. When a character appears more than
/// once, the first entry wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Substitutions(Vec<(char, String)>);

impl Substitutions {
    pub fn new(pairs: Vec<(char, String)>) -> Self {
        Self(pairs)
    }

    pub fn pairs(&self) -> &[(char, String)] {
        &self.0
    }

    fn replacement(&self, ch: char) -> Option<&str> {
        self.0
            .iter()
            .find(|(from, _)| *from == ch)
            .map(|(_, to)| to.as_str())
    }
}

impl Default for Substitutions {
    fn default() -> Self {
        Self(vec![
            (' ', "_".to_string()),
            ('%', "pct".to_string()),
            ('.', "pt".to_string()),
        ])
    }
}

/// Normalizes the base name of `file_name` and reattaches its extension.
pub fn normalize(file_name: &str, substitutions: &Substitutions) -> String {
    let (base, extension) = split_extension(file_name);
    let mut normalized = normalize_base(base, substitutions);
    if let Some(extension) = extension {
        normalized.push_str(extension);
    }
    normalized
}

/// Applies the substitutions in one left-to-right pass. Replacement text is
/// never scanned again.
pub fn normalize_base(base: &str, substitutions: &Substitutions) -> String {
    let mut normalized = String::with_capacity(base.len());
    for ch in base.chars() {
        match substitutions.replacement(ch) {
            Some(replacement) => normalized.push_str(replacement),
            None => normalized.push(ch),
        }
    }
    normalized
}

/// Splits `name` into base and extension (with its leading dot). A leading dot
/// alone does not start an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx..])),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_names_are_unchanged() {
        let subs = Substitutions::default();
        assert_eq!(normalize("Sample_1.raw", &subs), "Sample_1.raw");
        assert_eq!(normalize_base("QC_Shew_24_01", &subs), "QC_Shew_24_01");
    }

    #[test]
    fn extension_is_preserved() {
        let subs = Substitutions::default();
        assert_eq!(normalize("Sample 1.5%.raw", &subs), "Sample_1pt5pct.raw");
    }

    #[test]
    fn replacement_text_is_not_rescanned() {
        let subs = Substitutions::new(vec![(' ', "_".to_string()), ('_', "-".to_string())]);
        assert_eq!(normalize_base("a b_c", &subs), "a_b-c");
    }

    #[test]
    fn first_substitution_for_a_character_wins() {
        let subs = Substitutions::new(vec![(' ', "_".to_string()), (' ', "-".to_string())]);
        assert_eq!(normalize_base("a b", &subs), "a_b");
    }

    #[test]
    fn split_extension_handles_dot_files() {
        assert_eq!(split_extension(".hidden"), (".hidden", None));
        assert_eq!(split_extension("run.d"), ("run", Some(".d")));
        assert_eq!(split_extension("noext"), ("noext", None));
    }
}
