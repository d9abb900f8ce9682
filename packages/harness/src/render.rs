//! Human-readable diagnostic rendering for [`RequestResult`].
//!
//! Output is a sequence of named sections, each introduced by a
//! `----- <Section Name> #<id> -----` line. The default sections are the
//! request summary, the response summary, and the response links;
//! consumers may append their own via
//! [`RequestResult::add_renderer`](crate::RequestResult::add_renderer).
//! A renderer returning `None` omits its section entirely rather than
//! rendering it blank.

use std::fmt;

use colored::Colorize;

use crate::RequestResult;

pub type RenderFn = Box<dyn Fn(&RequestResult, bool) -> Option<Vec<String>> + Send + Sync>;

/// A named diagnostic section: a render function returning the section's
/// lines, or `None` to omit the section.
pub struct SectionRenderer {
    name: String,
    render: RenderFn,
}

impl SectionRenderer {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&RequestResult, bool) -> Option<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Box::new(render),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn render(&self, result: &RequestResult, colorize: bool) -> Option<Vec<String>> {
        (self.render)(result, colorize)
    }
}

impl fmt::Debug for SectionRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionRenderer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub(crate) fn default_renderers() -> Vec<SectionRenderer> {
    vec![
        SectionRenderer::new("Request", render_request),
        SectionRenderer::new("Response", render_response),
        SectionRenderer::new("Response Links", render_response_links),
    ]
}

fn highlight(line: String, colorize: bool) -> String {
    if colorize {
        line.yellow().to_string()
    } else {
        line
    }
}

fn dim(line: String, colorize: bool) -> String {
    if colorize {
        line.bright_black().to_string()
    } else {
        line
    }
}

fn render_request(result: &RequestResult, colorize: bool) -> Option<Vec<String>> {
    let mut lines = vec![highlight(
        format!("{} {}", result.method(), result.url()),
        colorize,
    )];
    for (name, value) in result.request_headers() {
        lines.push(format!("{name}: {value}"));
    }
    lines.push(String::new());
    if let Some(body) = result.request_body() {
        lines.push(dim(String::from_utf8_lossy(body).into_owned(), colorize));
    }
    Some(lines)
}

fn render_response(result: &RequestResult, colorize: bool) -> Option<Vec<String>> {
    let status_code = result.status_code()?;
    let status_message = result.status_message().unwrap_or_default();

    let mut lines = vec![highlight(
        format!("{status_code} {status_message}"),
        colorize,
    )];
    for (name, value) in result.headers() {
        lines.push(format!("{name}: {value}"));
    }
    lines.push(String::new());
    if let Some(body) = result.body().filter(|body| !body.is_empty()) {
        lines.push(dim(String::from_utf8_lossy(body).into_owned(), colorize));
    }
    Some(lines)
}

fn render_response_links(result: &RequestResult, colorize: bool) -> Option<Vec<String>> {
    let links = result.links()?;

    let lines = links
        .refs()
        .iter()
        .map(|def| {
            // Percent-encoded path separators read poorly; normalize them
            // back to literal slashes.
            let serialized = def.to_header().replace("%2F", "/");
            let rel = highlight(def.rel.clone(), colorize);
            format!("{rel}: {serialized}")
        })
        .collect();
    Some(lines)
}

impl RequestResult {
    /// Render the multi-section diagnostic dump. Sections with no content
    /// are omitted entirely.
    #[must_use]
    pub fn render(&self, colorize: bool) -> String {
        let mut out: Vec<String> = vec![];
        for renderer in self.renderers() {
            if let Some(lines) = renderer.render(self, colorize) {
                let header = format!("----- {} #{} -----", renderer.name(), self.id());
                out.push(if colorize {
                    header.blue().to_string()
                } else {
                    header
                });
                out.extend(lines);
            }
        }
        out.join("\n")
    }
}

impl fmt::Display for RequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}
