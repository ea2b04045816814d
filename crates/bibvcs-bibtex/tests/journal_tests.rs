//! Journal macro registry integration tests

mod common;

use bibvcs_bibtex::{parse, Bibliography, Journal, JournalRegistry, JournalStyle};
use common::fixtures::{load_bibtex_fixture, load_journal_fixture};
use rstest::rstest;

#[test]
fn test_config_and_legacy_formats_agree() {
    let config = JournalRegistry::from_config(&load_journal_fixture("journals.ini")).unwrap();
    let legacy = JournalRegistry::from_legacy_text(&load_journal_fixture("legacy.txt")).unwrap();
    assert_eq!(config, legacy);
    assert_eq!(
        config.iter().map(|j| j.macro_name.as_str()).collect::<Vec<_>>(),
        vec!["IEEECL", "JCSS", "TCS"]
    );
}

#[test]
fn test_jcss_scenario() {
    let mut registry = JournalRegistry::new();
    registry
        .add(Journal::new(
            "JCSS",
            "Journal of Computer and System Sciences",
            "J. Comput. Syst. Sci.",
        ))
        .unwrap();

    let full = parse(&registry.generate(JournalStyle::Full)).unwrap();
    let macros: Vec<_> = full.macros().collect();
    assert_eq!(macros.len(), 1);
    assert_eq!(macros[0].name(), "jcss");
    assert_eq!(
        macros[0].value().literal().as_deref(),
        Some("Journal of Computer and System Sciences")
    );

    let abbr = parse(&registry.generate(JournalStyle::Abbreviated)).unwrap();
    let macros: Vec<_> = abbr.macros().collect();
    assert_eq!(macros.len(), 1);
    assert_eq!(
        macros[0].value().literal().as_deref(),
        Some("J. Comput. Syst. Sci.")
    );
}

#[rstest]
#[case(JournalStyle::Full, "{IEEE} Communications Letters", "IEEE Communications Letters")]
#[case(JournalStyle::Abbreviated, "{IEEE} Commun. Lett.", "IEEE Commun. Lett.")]
fn test_journal_names_by_style(
    #[case] style: JournalStyle,
    #[case] raw: &str,
    #[case] display: &str,
) {
    let registry = JournalRegistry::from_config(&load_journal_fixture("journals.ini")).unwrap();
    let journal = registry.get("ieeecl").unwrap();
    assert_eq!(journal.name(style), raw);
    assert_eq!(journal.display_name(style), display);
}

#[rstest]
#[case(JournalStyle::Full, "IEEE Communications Letters")]
#[case(JournalStyle::Abbreviated, "IEEE Commun. Lett.")]
fn test_textify_with_registry(#[case] style: JournalStyle, #[case] expected: &str) {
    let registry = JournalRegistry::from_config(&load_journal_fixture("journals.ini")).unwrap();
    let bib = Bibliography::parse(&load_bibtex_fixture("database.bib")).unwrap();
    let journal = bib.entry("Helmling2014").unwrap().get("journal").unwrap();
    let source = registry.macros(style);
    assert_eq!(bib.textify(journal, &[&source]), expected);
}

#[test]
fn test_resolver_accepts_registry_as_source() {
    let registry = JournalRegistry::from_config(&load_journal_fixture("journals.ini")).unwrap();
    let bib = Bibliography::parse(&load_bibtex_fixture("database.bib")).unwrap();
    let source = registry.macros(JournalStyle::Full);
    let resolver = bib.resolver().with_source(&source);
    assert!(resolver.is_declared("IEEECL"));
    assert!(resolver.is_declared("jan"));
    assert!(resolver.is_declared("lncs"));
    assert!(!resolver.is_declared("nature"));
}

#[test]
fn test_generated_file_reflects_edits() {
    let mut registry = JournalRegistry::from_config(&load_journal_fixture("journals.ini")).unwrap();
    registry.remove("TCS").unwrap();
    registry
        .update("JCSS", "J. of Computer and System Sciences", "JCSS")
        .unwrap();
    let generated = registry.generate(JournalStyle::Abbreviated);
    assert!(generated.contains("@string{JCSS = \"JCSS\"}"));
    assert!(!generated.contains("TCS"));
    assert_eq!(generated.lines().filter(|l| l.starts_with('@')).count(), 2);
}
