use extramark_core::{Options, Transform};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SuiteCase {
    name: String,
    #[serde(default)]
    extra: bool,
    #[serde(default)]
    safe: bool,
    markdown: String,
    html: String,
}

#[test]
fn suite_manifest() -> Result<(), Box<dyn std::error::Error>> {
    let cases: Vec<SuiteCase> = serde_json::from_str(include_str!("suite.json"))?;
    let mut failures = Vec::new();

    for case in &cases {
        let mut options = Options::default();
        options.extra_mode = case.extra;
        options.safe_mode = case.safe;
        let actual = Transform::new(options).transform(&case.markdown);
        if actual != case.html {
            failures.push(format!(
                "{}:\n  markdown: {:?}\n  expected: {:?}\n  actual:   {:?}",
                case.name, case.markdown, case.html, actual
            ));
        }
    }

    if !failures.is_empty() {
        return Err(format!("{} case(s) failed:\n{}", failures.len(), failures.join("\n")).into());
    }
    Ok(())
}
