use std::time::Duration;

use reqwest::ClientBuilder;

fn has_proxy_env() -> bool {
    [
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
        "ALL_PROXY",
        "all_proxy",
    ]
    .iter()
    .any(|k| std::env::var(k).is_ok_and(|v| !v.trim().is_empty()))
}

// The chat bot webhook usually runs next to this process; a corporate proxy
// cannot reach it.
fn should_bypass_proxy_impl(url: &str, proxy_env_present: bool) -> bool {
    if !proxy_env_present {
        return false;
    }

    let Ok(u) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = u.host_str() else {
        return false;
    };

    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1") || host.ends_with(".localhost")
}

/// True when `url` points at this machine and a proxy is configured.
pub fn should_bypass_proxy(url: &str) -> bool {
    should_bypass_proxy_impl(url, has_proxy_env())
}

pub fn maybe_disable_proxy(builder: ClientBuilder, url: &str) -> ClientBuilder {
    if should_bypass_proxy(url) {
        builder.no_proxy()
    } else {
        builder
    }
}

pub fn client_for_url_with_timeout(
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let builder = reqwest::Client::builder().timeout(timeout);
    maybe_disable_proxy(builder, url).build()
}

pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

pub fn direct_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).no_proxy().build()
}

#[cfg(test)]
mod tests {
    use super::should_bypass_proxy_impl;

    #[test]
    fn bypass_proxy_for_loopback_when_proxy_env_present() {
        assert!(should_bypass_proxy_impl("http://localhost:8001/webhook_question", true));
        assert!(should_bypass_proxy_impl("http://127.0.0.1:8001", true));
        assert!(!should_bypass_proxy_impl("https://bot.example.com/hook", true));
    }

    #[test]
    fn do_not_bypass_without_proxy_env() {
        assert!(!should_bypass_proxy_impl("http://localhost:8001", false));
    }
}
