//! Trailer lookup response parser
//!
//! The lookup endpoint answers with JSON whose `code` field holds an embed
//! snippet; the trailer URL is the first iframe `src` without its query.

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TrailerResponse {
    code: Option<serde_json::Value>,
}

/// Extract the trailer URL from a lookup response body
///
/// A missing `code` key, an undecodable body or a snippet without an iframe
/// all mean the work has no trailer.
pub fn parse_trailer_response(body: &str) -> Option<String> {
    let response: TrailerResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            debug!("Trailer response is not valid JSON: {}", e);
            return None;
        }
    };

    let code = match response.code? {
        serde_json::Value::String(code) => code,
        _ => return None,
    };

    let iframe = Selector::parse("iframe[src]").ok()?;
    let fragment = Html::parse_fragment(&code);
    let src = fragment.select(&iframe).next()?.value().attr("src")?;

    let url = src.split('?').next().unwrap_or(src).trim();
    (!url.is_empty()).then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        r#"{"success":true,"code":"<iframe width=\"640\" src=\"https://www.youtube.com/embed/abc123?autoplay=1&iv_load_policy=3\"></iframe>"}"#,
        Some("https://www.youtube.com/embed/abc123")
    )]
    #[case(r#"{"success":true,"code":"<iframe src=\"https://player.example/v/9\"></iframe>"}"#, Some("https://player.example/v/9"))]
    #[case(r#"{"success":false,"message":"not found"}"#, None)]
    #[case(r#"{"success":true,"code":"<p>no trailer</p>"}"#, None)]
    #[case(r#"{"success":true,"code":false}"#, None)]
    #[case("<html>captcha</html>", None)]
    fn trailer_lookup_responses(#[case] body: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_trailer_response(body).as_deref(), expected);
    }
}
