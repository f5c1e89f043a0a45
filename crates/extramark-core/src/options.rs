//! Configuration options for the Markdown transform

/// Options for one [`Transform`](crate::Transform) instance.
///
/// A transform is a pure function of the input text and these options;
/// per-document state (link definitions, footnotes, abbreviations, used
/// heading ids) is reset at the start of every call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Escape unsafe HTML tags instead of passing them through.
    pub safe_mode: bool,

    /// Enable the "extra" dialect: tables, footnotes, definition lists,
    /// fenced code blocks, abbreviations, `{#id}` heading suffixes and
    /// intra-word-underscore suppression.
    pub extra_mode: bool,

    /// Treat all embedded HTML as deep-markdown-enabled by default.
    pub markdown_in_html: bool,

    /// Generate pandoc-style slug ids for headings lacking an explicit
    /// `{#id}`.
    pub auto_heading_ids: bool,

    /// Thematic-break-only lines become section-break markers instead of
    /// `<hr>`.
    pub user_breaks: bool,

    /// If non-zero, emit plain-text-only output truncated once this length
    /// is exceeded.
    pub summary_length: usize,

    /// Base location used to qualify relative link/image URLs.
    pub url_base_location: Option<String>,

    /// Root location used to qualify absolute-path link/image URLs.
    pub url_root_location: Option<String>,

    /// Downscale images wider than this (0 disables). Sizes come from the
    /// [`ImageSizeResolver`](crate::ImageSizeResolver) collaborator.
    pub max_image_width: u32,

    /// Filesystem root handed to the image-size collaborator.
    pub document_root: Option<String>,

    /// Location of the current document, for resolving relative image paths.
    pub document_location: Option<String>,

    /// Add `rel="nofollow"` to every link.
    pub no_follow_links: bool,

    /// Add `rel="nofollow"` to external links only.
    pub no_follow_external_links: bool,

    /// Add `target="_blank"` to external links.
    pub new_window_for_external_links: bool,

    /// Add `target="_blank"` to local links.
    pub new_window_for_local_links: bool,

    /// CSS class of the generated footnotes container.
    pub html_class_footnotes: String,

    /// CSS class wrapped around images carrying a title (extra mode).
    /// Empty disables the figure-style wrapper.
    pub html_class_titled_images: String,

    /// Divert `<head>...</head>` interiors out of the rendered body into a
    /// side buffer, retrievable via `Transform::head_block`.
    pub extract_head_blocks: bool,

    /// Template emitted before each top-level-heading-delimited section;
    /// `{0}` is replaced with the section index.
    pub section_header: Option<String>,

    /// Template emitted directly after each section heading.
    pub section_heading_suffix: Option<String>,

    /// Template emitted after each section.
    pub section_footer: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            safe_mode: false,
            extra_mode: false,
            markdown_in_html: false,
            auto_heading_ids: false,
            user_breaks: false,
            summary_length: 0,
            url_base_location: None,
            url_root_location: None,
            max_image_width: 0,
            document_root: None,
            document_location: None,
            no_follow_links: false,
            no_follow_external_links: false,
            new_window_for_external_links: false,
            new_window_for_local_links: false,
            html_class_footnotes: "footnotes".to_string(),
            html_class_titled_images: String::new(),
            extract_head_blocks: false,
            section_header: None,
            section_heading_suffix: None,
            section_footer: None,
        }
    }
}
