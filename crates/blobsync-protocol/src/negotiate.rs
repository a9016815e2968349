//! `Accept` header matching.

/// Does an `Accept` header admit `content_type`?
///
/// Matches exact media types, `type/*` wildcards and `*/*`. Parameters such
/// as `;q=0.9` or `;charset=utf-8` are ignored, and an empty header accepts
/// everything.
pub fn accepts(accept: &str, content_type: &str) -> bool {
    let wanted = essence(content_type);
    let Some((wanted_type, _)) = wanted.split_once('/') else {
        return accept.trim().is_empty() || accept.split(',').any(|r| essence(r) == "*/*");
    };

    if accept.trim().is_empty() {
        return true;
    }

    accept.split(',').map(essence).any(|range| {
        if range == "*/*" || range == wanted {
            return true;
        }
        match range.split_once('/') {
            Some((ty, "*")) => ty == wanted_type,
            _ => false,
        }
    })
}

/// Body of a 406 response.
pub fn not_acceptable_message(content_type: &str, accept: &str) -> String {
    format!("Content-Type of {content_type} not in Accept: {accept}")
}

fn essence(media: &str) -> String {
    media
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(accepts("text/plain", "text/plain"));
        assert!(accepts("text/html, text/plain", "text/plain"));
        assert!(!accepts("text/html", "text/plain"));
    }

    #[test]
    fn wildcards() {
        assert!(accepts("*/*", "image/png"));
        assert!(accepts("image/*", "image/png"));
        assert!(!accepts("text/*", "image/png"));
    }

    #[test]
    fn parameters_and_case_are_ignored() {
        assert!(accepts("Text/Plain;q=0.9", "text/plain; charset=utf-8"));
    }

    #[test]
    fn empty_accept_allows_anything() {
        assert!(accepts("", "application/octet-stream"));
    }

    #[test]
    fn mismatch_message_wording() {
        assert_eq!(
            not_acceptable_message("text/plain", "text/html"),
            "Content-Type of text/plain not in Accept: text/html"
        );
    }
}
