use extramark_core::{join_sections, split_sections, Options, Transform};

#[test]
fn splits_at_top_level_headings() {
    let source = "# One\nalpha\n\n## Nested\n\n# Two\nbeta\n";
    let sections = split_sections(source);
    assert_eq!(sections.len(), 2);
    assert!(sections[0].contains("## Nested"));
    assert!(sections[1].starts_with("# Two"));
}

#[test]
fn second_level_headings_split_when_they_are_the_top() {
    let source = "## A\nx\n\n## B\ny\n";
    let sections = split_sections(source);
    assert_eq!(sections.len(), 2);
}

#[test]
fn break_markers_split_sections() {
    let source = "alpha\n\n* * *\n\nbeta\n";
    let sections = split_sections(source);
    assert_eq!(sections.len(), 2);
    assert!(sections[1].starts_with("* * *"));
}

#[test]
fn split_then_join_round_trips() {
    let source = "# One\nalpha\n\n# Two\nbeta\n";
    assert_eq!(join_sections(&split_sections(source)), source);

    let with_breaks = "alpha\n\n---\n\nbeta\n";
    assert_eq!(join_sections(&split_sections(with_breaks)), with_breaks);
}

#[test]
fn headingless_documents_are_one_section() {
    let sections = split_sections("just\nsome text\n");
    assert_eq!(sections, vec!["just\nsome text".to_string()]);
}

#[test]
fn section_templates_wrap_heading_delimited_sections() {
    let mut options = Options::default();
    options.section_header = Some("<section id=\"s{0}\">\n".to_string());
    options.section_heading_suffix = Some("<a href=\"#top\">top</a>\n".to_string());
    options.section_footer = Some("</section>\n".to_string());
    let mut transform = Transform::new(options);
    let out = transform.transform("# A\ntext\n\n# B");
    assert_eq!(
        out,
        "<section id=\"s1\">\n<h1>A</h1>\n<a href=\"#top\">top</a>\n<p>text</p>\n\
         </section>\n<section id=\"s2\">\n<h1>B</h1>\n<a href=\"#top\">top</a>\n</section>\n"
    );
}

#[test]
fn content_before_the_first_heading_is_untemplated() {
    let mut options = Options::default();
    options.section_header = Some("[{0}]".to_string());
    let mut transform = Transform::new(options);
    let out = transform.transform("intro\n\n# A\nx");
    assert!(out.starts_with("<p>intro</p>\n[1]<h1>A</h1>\n"));
}
