//! Markup template compiler for bundle components and the page shell.
//!
//! Templates are plain markup with `{{ ... }}` expressions. Compilation
//! happens once per bundle so rendering only walks prepared segments.

use thiserror::Error;

use super::bundle::BundleError;

pub const TEMPLATE_FILE: &str = "index.template.html";
pub const OUTLET_MARKER: &str = "<!--ssr-outlet-->";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed expression starting at byte {offset}")]
    Unclosed { offset: usize },
    #[error("empty expression at byte {offset}")]
    Empty { offset: usize },
    #[error("unknown expression `{expr}`")]
    Unknown { expr: String },
}

/// Values a template can interpolate. `Styles`, `Scripts` and
/// `ResourceHints` are manifest-derived markup and only valid in the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Url,
    Title,
    Param(String),
    Styles,
    Scripts,
    ResourceHints,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Value(Expr),
    Include(String),
    Outlet,
}

pub fn compile(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while let Some(found) = source[cursor..].find(OPEN) {
        let start = cursor + found;
        if start > cursor {
            segments.push(Segment::Text(source[cursor..start].to_string()));
        }

        let body_start = start + OPEN.len();
        let Some(len) = source[body_start..].find(CLOSE) else {
            return Err(TemplateError::Unclosed { offset: start });
        };
        let expr = source[body_start..body_start + len].trim();
        if expr.is_empty() {
            return Err(TemplateError::Empty { offset: start });
        }
        segments.push(parse_expr(expr)?);
        cursor = body_start + len + CLOSE.len();
    }

    if cursor < source.len() {
        segments.push(Segment::Text(source[cursor..].to_string()));
    }

    Ok(segments)
}

fn parse_expr(expr: &str) -> Result<Segment, TemplateError> {
    if let Some(name) = expr.strip_prefix('>') {
        let name = name.trim();
        if name.is_empty() {
            return Err(TemplateError::Unknown {
                expr: expr.to_string(),
            });
        }
        return Ok(Segment::Include(name.to_string()));
    }

    let segment = match expr {
        "outlet" => Segment::Outlet,
        "url" => Segment::Value(Expr::Url),
        "title" => Segment::Value(Expr::Title),
        "styles" => Segment::Value(Expr::Styles),
        "scripts" => Segment::Value(Expr::Scripts),
        "resource_hints" => Segment::Value(Expr::ResourceHints),
        other => match other.strip_prefix("params.") {
            Some(name) if !name.is_empty() => Segment::Value(Expr::Param(name.to_string())),
            _ => {
                return Err(TemplateError::Unknown {
                    expr: other.to_string(),
                });
            }
        },
    };
    Ok(segment)
}

/// Page shell wrapped around the application markup.
///
/// The single [`OUTLET_MARKER`] splits the shell into a head, streamed before
/// any component renders, and a tail, streamed after the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    pub head: Vec<Segment>,
    pub tail: Vec<Segment>,
}

impl PageTemplate {
    pub fn parse(source: &str) -> Result<Self, BundleError> {
        let markers = source.matches(OUTLET_MARKER).count();
        let Some((head, tail)) = source.split_once(OUTLET_MARKER).filter(|_| markers == 1) else {
            return Err(BundleError::PageOutlet(markers));
        };

        Ok(Self {
            head: compile(head).map_err(BundleError::PageTemplate)?,
            tail: compile(tail).map_err(BundleError::PageTemplate)?,
        })
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_text_values_and_includes() {
        let segments =
            compile("<h1>{{ title }}</h1>{{> playlist }}<p>{{params.id}}</p>{{ outlet }}")
                .expect("template should compile");
        assert_eq!(
            segments,
            vec![
                Segment::Text("<h1>".into()),
                Segment::Value(Expr::Title),
                Segment::Text("</h1>".into()),
                Segment::Include("playlist".into()),
                Segment::Text("<p>".into()),
                Segment::Value(Expr::Param("id".into())),
                Segment::Text("</p>".into()),
                Segment::Outlet,
            ]
        );
    }

    #[test]
    fn plain_text_is_a_single_segment() {
        assert_eq!(
            compile("<footer></footer>").expect("compile"),
            vec![Segment::Text("<footer></footer>".into())]
        );
        assert!(compile("").expect("compile").is_empty());
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(
            compile("<p>{{ title </p>"),
            Err(TemplateError::Unclosed { offset: 3 })
        );
        assert_eq!(compile("{{ }}"), Err(TemplateError::Empty { offset: 0 }));
        assert!(matches!(
            compile("{{ user.name }}"),
            Err(TemplateError::Unknown { .. })
        ));
        assert!(matches!(
            compile("{{ params. }}"),
            Err(TemplateError::Unknown { .. })
        ));
        assert!(matches!(compile("{{> }}"), Err(TemplateError::Unknown { .. })));
    }

    #[test]
    fn page_template_splits_on_outlet() {
        let template = PageTemplate::parse(
            "<html><head><title>{{ title }}</title></head><body><!--ssr-outlet--></body></html>",
        )
        .expect("template should parse");
        assert_eq!(
            template.head,
            vec![
                Segment::Text("<html><head><title>".into()),
                Segment::Value(Expr::Title),
                Segment::Text("</title></head><body>".into()),
            ]
        );
        assert_eq!(template.tail, vec![Segment::Text("</body></html>".into())]);
    }

    #[test]
    fn page_template_requires_exactly_one_outlet() {
        assert!(matches!(
            PageTemplate::parse("<body></body>"),
            Err(BundleError::PageOutlet(0))
        ));
        assert!(matches!(
            PageTemplate::parse("<!--ssr-outlet--><!--ssr-outlet-->"),
            Err(BundleError::PageOutlet(2))
        ));
    }

    #[test]
    fn escapes_markup_characters() {
        let mut out = String::new();
        escape_html_into(&mut out, r#"<a href="x">Tom & 'Jerry'</a>"#);
        assert_eq!(
            out,
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
