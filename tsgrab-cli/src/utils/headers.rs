use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Parse a header string in format "Name: Value" and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    // Find the first colon which separates name and value
    let Some(colon_pos) = header_str.find(':') else {
        tracing::warn!(
            "Invalid header format: '{}'. Expected 'Name: Value'",
            header_str
        );
        return;
    };

    let name = header_str[..colon_pos].trim();
    let value = header_str[colon_pos + 1..].trim();

    // Empty values are never sent
    if value.is_empty() {
        debug!("Skipping empty header: '{}'", name);
        return;
    }

    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        tracing::warn!("Invalid header name: '{}'", name);
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        tracing::warn!("Invalid header value: '{}'", value);
        return;
    };

    debug!("Adding header: {}", name);
    headers.insert(header_name, header_value);
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&[
            "Origin: https://player.example.com".to_string(),
            "X-Token:abc:def".to_string(),
            "broken".to_string(),
            "X-Empty:   ".to_string(),
            "Bad Name: value".to_string(),
        ]);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["origin"], "https://player.example.com");
        // Only the first colon separates name and value
        assert_eq!(headers["x-token"], "abc:def");
    }
}
