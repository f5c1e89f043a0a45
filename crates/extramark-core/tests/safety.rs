use extramark_core::{Options, Transform};

fn safe() -> Options {
    let mut options = Options::default();
    options.safe_mode = true;
    options
}

#[test]
fn script_blocks_never_survive_safe_mode() {
    let out = Transform::new(safe()).transform("<script>alert(1)</script>");
    assert!(!out.contains("<script"));
    assert!(out.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
}

#[test]
fn script_blocks_pass_through_without_safe_mode() {
    let out = Transform::new(Options::default()).transform("<script>alert(1)</script>");
    assert!(out.contains("<script>alert(1)</script>"));
}

#[test]
fn allowed_inline_tags_survive_safe_mode() {
    let out = Transform::new(safe()).transform("keep <b>bold</b> and <em>em</em>");
    assert!(out.contains("<b>bold</b>"));
    assert!(out.contains("<em>em</em>"));
}

#[test]
fn disallowed_attributes_escape_the_tag() {
    let out = Transform::new(safe()).transform("x <em onclick=evil>y");
    assert!(out.contains("&lt;em onclick=evil&gt;"));
}

#[test]
fn unsafe_link_schemes_are_rejected() {
    let out = Transform::new(safe()).transform("x <a href=\"javascript:alert(1)\">y</a>");
    assert!(!out.contains("<a href=\"javascript"));
    assert!(out.contains("&lt;a href="));
}

#[test]
fn safe_href_schemes_are_kept() {
    let out = Transform::new(safe()).transform("x <a href=\"https://example.com\">y</a>");
    assert!(out.contains("<a href=\"https://example.com\">"));
}

#[test]
fn one_unsafe_tag_coarsens_the_whole_region() {
    let mut options = safe();
    options.extra_mode = true;
    let out = Transform::new(options)
        .transform("<div markdown=\"1\">\n<script>x()</script>\n*md*\n</div>");
    assert!(!out.contains("<script"));
    assert!(out.contains("&lt;script&gt;"));
    // Nothing in the region renders as markup, markdown included.
    assert!(!out.contains("<em>"));
}

#[test]
fn comments_are_escaped_in_safe_mode() {
    let out = Transform::new(safe()).transform("<!-- secret -->");
    assert!(!out.contains("<!--"));
    let out = Transform::new(Options::default()).transform("<!-- kept -->");
    assert!(out.contains("<!-- kept -->"));
}

#[test]
fn sanitized_output_strips_what_the_allow_list_rejects() {
    let mut transform = Transform::new(Options::default());
    let out = transform.transform_sanitized("*em* text\n\n<script>bad()</script>");
    assert!(!out.contains("<script"));
    assert!(out.contains("<em>em</em>"));
}

#[test]
fn head_blocks_divert_to_the_side_buffer() {
    let mut options = Options::default();
    options.extract_head_blocks = true;
    let mut transform = Transform::new(options);
    let out = transform.transform("<head>\n<title>T</title>\n</head>\nBody");
    assert_eq!(out, "<p>Body</p>\n");
    assert_eq!(transform.head_block(), "<title>T</title>\n");
}

#[test]
fn rendered_fragment_is_well_formed() -> Result<(), Box<dyn std::error::Error>> {
    let mut options = Options::default();
    options.extra_mode = true;
    let source = "\
# Title

Some *emphasis*, **strong**, `code` and a [link](http://example.com).

* item one
* item two

> quoted

| a | b |
| :-- | --: |
| 1 | 2 |

---

    indented code
";
    let html = Transform::new(options).transform(source);
    let wrapped = format!("<root>{}</root>", html);
    roxmltree::Document::parse(&wrapped)?;
    Ok(())
}
