use crate::error::Result;
use url::Url;

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// `<base>/api`, without doubling the suffix when the base already carries it.
pub fn api_base(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
}

/// Live channel address for one conversation: `ws(s)://<host>/api/chat/ws/<id>?token=<credential>`.
pub fn chat_socket_url(base_url: &str, conversation_id: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(&api_base(base_url))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an allowed scheme swap
    let _ = url.set_scheme(scheme);
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .extend(["chat", "ws", conversation_id]);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_strips_slash() {
        assert_eq!(normalize_url(" barter.example/ "), "https://barter.example");
        assert_eq!(normalize_url("http://localhost:8000/"), "http://localhost:8000");
    }

    #[test]
    fn api_base_is_not_doubled() {
        assert_eq!(api_base("http://h:1"), "http://h:1/api");
        assert_eq!(api_base("http://h:1/api/"), "http://h:1/api");
    }

    #[test]
    fn socket_url_follows_http_scheme() {
        let url = chat_socket_url("https://barter.example", "m1", "t k").unwrap();
        assert_eq!(url.as_str(), "wss://barter.example/api/chat/ws/m1?token=t+k");
        let url = chat_socket_url("http://localhost:8000", "m2", "tok").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/chat/ws/m2?token=tok");
    }
}
