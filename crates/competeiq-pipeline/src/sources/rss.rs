//! RSS 2.0 feed parsing and HTML stripping.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::RawArticle;
use crate::error::PipelineError;

#[derive(Default)]
struct ItemFields {
    title: String,
    link: String,
    description: String,
    pub_date: String,
}

impl ItemFields {
    fn push(&mut self, tag: &str, text: &str) {
        let slot = match tag {
            "title" => &mut self.title,
            "link" => &mut self.link,
            "description" => &mut self.description,
            "pubDate" => &mut self.pub_date,
            _ => return,
        };
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(text);
    }

    fn into_article(self) -> Option<RawArticle> {
        let title = strip_html(&self.title);
        let link = self.link.trim().to_string();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        Some(RawArticle {
            title,
            content: strip_html(&self.description),
            url: link,
            published_at: parse_pub_date(&self.pub_date),
        })
    }
}

/// Parse RSS `<item>` elements into [`RawArticle`]s.
///
/// Pulls `<title>`, `<link>`, `<description>` and `<pubDate>`. Items without
/// a title or link are skipped. HTML in titles and descriptions is stripped.
/// Stops after `max_items` articles.
///
/// # Errors
///
/// Returns [`PipelineError::Xml`] when the document is not well-formed.
pub fn parse_rss_feed(xml: &str, max_items: usize) -> Result<Vec<RawArticle>, PipelineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles = Vec::new();
    let mut item: Option<ItemFields> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "item" {
                    item = Some(ItemFields::default());
                    current_tag.clear();
                } else if item.is_some() && current_tag != "description" {
                    current_tag = name;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let name = String::from_utf8_lossy(name.as_ref());
                if name == "item" {
                    if let Some(article) = item.take().and_then(ItemFields::into_article) {
                        articles.push(article);
                        if articles.len() >= max_items {
                            break;
                        }
                    }
                    current_tag.clear();
                } else if name == current_tag {
                    current_tag.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(fields) = item.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    fields.push(&current_tag, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(fields) = item.as_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    fields.push(&current_tag, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PipelineError::Xml(e)),
            _ => {}
        }
    }

    Ok(articles)
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Strip HTML tags from a string and normalize whitespace.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Channel title is ignored</title>
  <item>
    <title><![CDATA[Xiaomi <b>beats</b> estimates]]></title>
    <link>https://example.com/xiaomi</link>
    <description><![CDATA[<p>Revenue <em>surges</em> 20%</p>]]></description>
    <pubDate>Thu, 02 Jan 2025 10:00:00 +0000</pubDate>
  </item>
  <item>
    <title>No link here</title>
  </item>
  <item>
    <title>OnePlus recall</title>
    <link>https://example.com/oneplus</link>
    <pubDate>not a date</pubDate>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_skips_incomplete_ones() {
        let articles = parse_rss_feed(FEED, 10).unwrap();
        assert_eq!(articles.len(), 2);

        assert_eq!(articles[0].title, "Xiaomi beats estimates");
        assert_eq!(articles[0].content, "Revenue surges 20%");
        assert_eq!(
            articles[0].published_at,
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap())
        );

        assert_eq!(articles[1].url, "https://example.com/oneplus");
        assert!(articles[1].content.is_empty());
        assert!(articles[1].published_at.is_none());
    }

    #[test]
    fn respects_max_items() {
        assert_eq!(parse_rss_feed(FEED, 1).unwrap().len(), 1);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_rss_feed("<rss><item><title>x</item></rss>", 10).unwrap_err();
        assert!(matches!(err, PipelineError::Xml(_)));
    }

    #[test]
    fn strip_html_normalizes_whitespace() {
        assert_eq!(strip_html("<p>Hello</p><p>world</p>"), "Hello world");
        assert_eq!(strip_html("  plain   text "), "plain text");
    }
}
