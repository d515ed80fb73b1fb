use tracing::{info, warn};

/// Split a header string in format "Name: Value"
fn parse_header(header_str: &str) -> Option<(String, String)> {
    // Find the first colon which separates name and value
    let Some((name, value)) = header_str.split_once(':') else {
        warn!("Invalid header format: '{}'. Expected 'Name: Value'", header_str);
        return None;
    };

    let name = name.trim();
    if name.is_empty() {
        warn!("Invalid header name in '{}'", header_str);
        return None;
    }

    Some((name.to_string(), value.trim().to_string()))
}

/// Parse a collection of header strings into name/value pairs
pub fn parse_headers(header_strings: &[String]) -> Vec<(String, String)> {
    header_strings
        .iter()
        .filter_map(|header_str| parse_header(header_str))
        .inspect(|(name, value)| info!("Adding header: {}: {}", name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&[
            "Referer: https://www.youtube.com/".to_string(),
            "X-Empty:".to_string(),
            "missing-colon".to_string(),
            ": no-name".to_string(),
        ]);

        assert_eq!(
            headers,
            vec![
                ("Referer".to_string(), "https://www.youtube.com/".to_string()),
                ("X-Empty".to_string(), String::new()),
            ]
        );
    }
}
