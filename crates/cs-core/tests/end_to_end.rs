use cs_core::{
    load_table, parse_code_system, parse_delimited_str, parse_file, reconcile, to_fsh,
    write_fsh, CodeStatus, Error, MergeConfig, ParseOptions,
};
use std::fs;

const INPUT: &str = r#"CodeSystem: Letters
Id: letters
Title: "Letters"
Description: "Greek letters"
* ^content: complete
* ^status: draft
* ^url: "http://example.org/CodeSystem/letters"
* ^version: "0.1.0"
* ^property[0].code = #status
* ^property[=].type = #string

* #B "Beta"
* #A "Alpha"
"#;

const TABLE: &str = "code,display,statusCol\nA,Alpha2,draft\nC,Gamma,\n";

#[test]
fn test_update_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let fsh_path = dir.path().join("letters.fsh");
    let table_path = dir.path().join("letters.csv");
    let out_path = dir.path().join("out.fsh");
    fs::write(&fsh_path, INPUT).unwrap();
    fs::write(&table_path, TABLE).unwrap();

    let options = ParseOptions::default();
    let mut parsed = parse_file(&fsh_path, &options).unwrap();
    assert!(parsed.warnings.is_empty());

    let table = load_table(&table_path).unwrap();
    let config = MergeConfig::default().map_property("status", "statusCol");
    let report = reconcile(&mut parsed.code_system, &table, &config).unwrap();

    assert_eq!(report.added, vec!["C"]);
    assert_eq!(report.updated, vec!["A"]);
    assert_eq!(report.deactivated, vec!["B"]);

    write_fsh(&parsed.code_system, &out_path).unwrap();
    let output = fs::read_to_string(&out_path).unwrap();
    let body: Vec<&str> = output
        .lines()
        .skip_while(|l| !l.is_empty())
        .skip(1)
        .collect();

    assert_eq!(
        body,
        vec![
            "* #A \"Alpha2\"",
            "* #A ^property[0].code = #status",
            "* #A ^property[=].valueString = \"draft\"",
            "* #B \"Beta\"",
            "* #B ^property[0].code = #inactive",
            "* #B ^property[=].valueString = \"true\"",
            "* #C \"Gamma\"",
        ]
    );

    let reparsed = parse_file(&out_path, &options).unwrap().code_system;
    assert_eq!(reparsed, parsed.code_system);
    assert_eq!(reparsed.codes["B"].status, CodeStatus::Inactive);
    assert_eq!(reparsed.codes["C"].status, CodeStatus::Active);
    assert!(reparsed.codes["C"].properties.is_empty());
}

#[test]
fn test_second_run_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let fsh_path = dir.path().join("letters.fsh");
    let table_path = dir.path().join("letters.tsv");
    fs::write(&fsh_path, INPUT).unwrap();
    fs::write(&table_path, "code\tdisplay\nA\tAlpha\nB\tBeta\n").unwrap();

    let options = ParseOptions::default();
    let config = MergeConfig::default();
    let table = load_table(&table_path).unwrap();

    let mut first = parse_file(&fsh_path, &options).unwrap().code_system;
    reconcile(&mut first, &table, &config).unwrap();
    write_fsh(&first, &fsh_path).unwrap();
    let written = fs::read_to_string(&fsh_path).unwrap();

    let mut second = parse_file(&fsh_path, &options).unwrap().code_system;
    let report = reconcile(&mut second, &table, &config).unwrap();
    write_fsh(&second, &fsh_path).unwrap();

    assert!(report.added.is_empty());
    assert!(report.deactivated.is_empty());
    assert_eq!(fs::read_to_string(&fsh_path).unwrap(), written);
}

#[test]
fn test_code_with_space_survives_save_and_next_run() {
    let options = ParseOptions::default();
    let config = MergeConfig::default();
    let mut cs = parse_code_system("CodeSystem: Answers\n", &options)
        .unwrap()
        .code_system;
    let table = parse_delimited_str("code,display\nnot applicable,N/A\nA,Alpha\n", b',', "a.csv")
        .unwrap();
    reconcile(&mut cs, &table, &config).unwrap();

    let parsed = parse_code_system(&to_fsh(&cs), &options).unwrap();
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    assert_eq!(parsed.code_system, cs);

    // The code left the table: it must be kept and flagged, not re-added or lost
    let mut next = parsed.code_system;
    let table = parse_delimited_str("code,display\nA,Alpha\n", b',', "a.csv").unwrap();
    let report = reconcile(&mut next, &table, &config).unwrap();
    assert_eq!(report.deactivated, vec!["not applicable"]);
    assert_eq!(next.codes["not applicable"].status, CodeStatus::Inactive);
}

#[test]
fn test_file_with_trailing_entity_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let fsh_path = dir.path().join("bundle.fsh");
    let content = format!("{}\nValueSet: LettersVS\n* include codes from system Letters\n", INPUT);
    fs::write(&fsh_path, &content).unwrap();

    let parsed = parse_file(&fsh_path, &ParseOptions::default()).unwrap();
    assert_eq!(parsed.code_system.code_count(), 2);

    let err = parsed.ensure_rewritable(&fsh_path).unwrap_err();
    assert!(matches!(err, Error::TrailingContent { ref keyword, .. } if keyword == "ValueSet"));
    assert_eq!(fs::read_to_string(&fsh_path).unwrap(), content);
}

#[test]
fn test_spreadsheet_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("letters.xlsx");

    let err = load_table(&path).unwrap_err();
    assert!(err.to_string().contains(".xlsx"));
}
