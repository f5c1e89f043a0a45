use extramark_core::{Options, Transform};

fn html(source: &str) -> String {
    Transform::new(Options::default()).transform(source)
}

#[test]
fn plain_text_becomes_one_paragraph() {
    assert_eq!(html("hello world"), "<p>hello world</p>\n");
    assert_eq!(html("two\nlines"), "<p>two\nlines</p>\n");
}

#[test]
fn atx_headings() {
    assert_eq!(html("# H"), "<h1>H</h1>\n");
    assert_eq!(html("### Deep"), "<h3>Deep</h3>\n");
    assert_eq!(html("# Trailing ##"), "<h1>Trailing</h1>\n");
}

#[test]
fn heading_levels_clamp_to_six() {
    assert_eq!(html("####### Seven"), "<h6>Seven</h6>\n");
}

#[test]
fn setext_headings() {
    assert_eq!(html("H\n==="), "<h1>H</h1>\n");
    assert_eq!(html("H\n---"), "<h2>H</h2>\n");
}

#[test]
fn setext_markers_degrade_without_a_paragraph() {
    assert_eq!(html("---"), "<hr />\n");
    assert_eq!(html("=="), "<p>==</p>\n");
}

#[test]
fn emphasis_pairing_is_associative_by_width() {
    assert_eq!(
        html("*test **test***"),
        "<p><em>test <strong>test</strong></em></p>\n"
    );
    assert_eq!(
        html("**test *test***"),
        "<p><strong>test <em>test</em></strong></p>\n"
    );
}

#[test]
fn unmatched_marks_stay_literal() {
    assert_eq!(html("word * notem * word"), "<p>word * notem * word</p>\n");
    assert_eq!(html("dangling *here"), "<p>dangling *here</p>\n");
}

#[test]
fn smart_encoding_is_exactly_once() {
    assert_eq!(html("AT&T & &amp;"), "<p>AT&amp;T &amp; &amp;</p>\n");
    assert_eq!(html("1 < 2 > 0 \"q\""), "<p>1 &lt; 2 &gt; 0 &quot;q&quot;</p>\n");
}

#[test]
fn code_blocks_use_the_strict_encoder() {
    assert_eq!(html("    a & b"), "<pre><code>a &amp; b\n</code></pre>\n");
    // An existing entity double-escapes inside code.
    assert_eq!(html("    &amp;"), "<pre><code>&amp;amp;\n</code></pre>\n");
}

#[test]
fn indentation_inside_a_paragraph_is_a_continuation() {
    assert_eq!(html("text\n    more"), "<p>text\n    more</p>\n");
}

#[test]
fn indentation_after_a_blank_starts_code() {
    assert_eq!(
        html("text\n\n    code"),
        "<p>text</p>\n<pre><code>code\n</code></pre>\n"
    );
}

#[test]
fn block_quotes_with_lazy_continuation() {
    assert_eq!(html("> a\n> b"), "<blockquote>\n<p>a\nb</p>\n</blockquote>\n");
    assert_eq!(html("> q\ncont"), "<blockquote>\n<p>q\ncont</p>\n</blockquote>\n");
}

#[test]
fn tight_lists() {
    assert_eq!(html("* one\n* two"), "<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n");
    assert_eq!(html("1. a\n2. b"), "<ol>\n<li>a</li>\n<li>b</li>\n</ol>\n");
}

#[test]
fn nested_lists_from_indented_markers() {
    assert_eq!(
        html("* a\n  * b"),
        "<ul>\n<li>a\n<ul>\n<li>b</li>\n</ul>\n</li>\n</ul>\n"
    );
}

#[test]
fn list_markers_mid_paragraph_revert_to_text() {
    assert_eq!(html("text\n* not a list"), "<p>text\n* not a list</p>\n");
}

#[test]
fn thematic_breaks() {
    assert_eq!(html("* * *"), "<hr />\n");
    assert_eq!(html("___"), "<hr />\n");
}

#[test]
fn inline_links() {
    assert_eq!(
        html("[x](http://e.com)"),
        "<p><a href=\"http://e.com\">x</a></p>\n"
    );
    assert_eq!(
        html("[x](http://e.com \"T\")"),
        "<p><a href=\"http://e.com\" title=\"T\">x</a></p>\n"
    );
}

#[test]
fn reference_links_resolve_case_insensitively() {
    let source = "[x][Link1]\n\n[link1]: http://example.com";
    assert_eq!(html(source), "<p><a href=\"http://example.com\">x</a></p>\n");
    let source = "[x][link1]\n\n[LINK1]: http://example.com";
    assert_eq!(html(source), "<p><a href=\"http://example.com\">x</a></p>\n");
}

#[test]
fn unresolved_references_render_literally() {
    assert_eq!(html("[x][missing]"), "<p>[x][missing]</p>\n");
}

#[test]
fn images() {
    assert_eq!(
        html("![alt](http://e.com/i.png)"),
        "<p><img src=\"http://e.com/i.png\" alt=\"alt\" /></p>\n"
    );
}

#[test]
fn autolinks() {
    assert_eq!(
        html("<http://example.com>"),
        "<p><a href=\"http://example.com\">http://example.com</a></p>\n"
    );
}

#[test]
fn email_autolinks_are_obfuscated() {
    let out = html("<joe@example.com>");
    assert!(!out.contains("joe@example.com"));
    assert!(out.contains("&#106;&#111;&#101;"));
}

#[test]
fn hard_line_breaks_from_two_trailing_spaces() {
    assert_eq!(html("a  \nb"), "<p>a<br />\nb</p>\n");
}

#[test]
fn backslash_escapes() {
    assert_eq!(html("\\*x\\*"), "<p>*x*</p>\n");
}

#[test]
fn inline_html_passes_through() {
    assert_eq!(html("a <b>c</b>"), "<p>a <b>c</b></p>\n");
}

#[test]
fn html_blocks_pass_through_verbatim() {
    assert_eq!(html("<div>\nx\n</div>"), "<div>\nx\n</div>\n");
}

#[test]
fn link_url_qualification() {
    let mut options = Options::default();
    options.url_base_location = Some("http://example.com/sub".to_string());
    options.url_root_location = Some("http://example.com".to_string());
    let mut transform = Transform::new(options);
    assert_eq!(
        transform.transform("[a](page.html) [b](/root.html)"),
        "<p><a href=\"http://example.com/sub/page.html\">a</a> \
         <a href=\"http://example.com/root.html\">b</a></p>\n"
    );
}

#[test]
fn nofollow_and_new_window_attributes() {
    let mut options = Options::default();
    options.no_follow_links = true;
    options.new_window_for_external_links = true;
    let mut transform = Transform::new(options);
    assert_eq!(
        transform.transform("[x](http://e.com)"),
        "<p><a href=\"http://e.com\" rel=\"nofollow\" target=\"_blank\">x</a></p>\n"
    );
}

#[test]
fn user_breaks_replace_horizontal_rules() {
    let mut options = Options::default();
    options.user_breaks = true;
    let mut transform = Transform::new(options);
    assert_eq!(
        transform.transform("a\n\n---\n\nb"),
        "<p>a</p>\n<div class=\"section-break\"></div>\n<p>b</p>\n"
    );
}

#[test]
fn summary_mode_emits_truncated_plain_text() {
    let mut options = Options::default();
    options.summary_length = 10;
    let mut transform = Transform::new(options);
    let out = transform.transform("# Title\n\nFirst paragraph of text.\n\nSecond one never shows.");
    assert!(out.starts_with("Title"));
    assert!(!out.contains('<'));
    assert!(!out.contains("Second"));
}

#[test]
fn state_resets_between_transforms() {
    let mut transform = Transform::new(Options::default());
    let first = transform.transform("[x][id]\n\n[id]: http://one.example");
    let second = transform.transform("[x][id]");
    assert!(first.contains("http://one.example"));
    // The definition from the first document must not leak.
    assert_eq!(second, "<p>[x][id]</p>\n");
}
