//! Browser-like request headers per upstream source.

use std::collections::BTreeMap;

use crate::Source;

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "en-US,en;q=0.9,vi-VN;q=0.8,vi;q=0.7"),
    ("Connection", "keep-alive"),
    ("Content-Type", "application/json"),
    ("Cache-Control", "no-cache"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-site"),
    ("DNT", "1"),
    ("Pragma", "no-cache"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-ch-ua-mobile", "?0"),
];

/// `(browser, user agent)` profiles.
pub const USER_AGENTS: &[(&str, &str)] = &[
    (
        "chrome",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "safari",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_2_1) AppleWebKit/605.1.15 Version/16.3 Safari/605.1.15",
    ),
    (
        "coccoc",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:110.0) Gecko/20100101 Firefox/110.0 CocCocBrowser/123.0",
    ),
    (
        "firefox",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    ),
    (
        "brave",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Brave/120.0.0.0 Safari/537.36",
    ),
    (
        "vivaldi",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Vivaldi/6.2.3105.58 Safari/537.36",
    ),
];

/// Referer and Origin sent to each source, if any.
pub const fn source_origin(source: Source) -> Option<&'static str> {
    match source {
        Source::Vci => Some("https://trading.vietcap.com.vn/"),
        Source::Tcbs => Some("https://tcinvest.tcbs.com.vn/"),
        Source::Msn => Some("https://www.msn.com/"),
        Source::Kbs => None,
        Source::Fmarket => Some("https://fmarket.vn/"),
    }
}

/// User agent string, either the Chrome profile or a random one.
pub fn user_agent(random_agent: bool) -> &'static str {
    let index = if random_agent {
        fastrand::usize(..USER_AGENTS.len())
    } else {
        0
    };
    USER_AGENTS[index].1
}

/// Full header set for requests to `source`. Names are lowercased.
pub fn source_headers(source: Source, random_agent: bool) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = DEFAULT_HEADERS
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), (*value).to_owned()))
        .collect();
    headers.insert(String::from("user-agent"), user_agent(random_agent).to_owned());
    if let Some(origin) = source_origin(source) {
        headers.insert(String::from("referer"), origin.to_owned());
        headers.insert(String::from("origin"), origin.to_owned());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vci_headers_have_referer_and_default_agent() {
        let headers = source_headers(Source::Vci, false);

        assert_eq!(
            headers.get("referer").map(String::as_str),
            Some("https://trading.vietcap.com.vn/")
        );
        assert_eq!(headers.get("origin"), headers.get("referer"));
        assert_eq!(headers.get("user-agent").map(String::as_str), Some(USER_AGENTS[0].1));
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn random_agent_picks_a_known_profile() {
        for _ in 0..20 {
            let agent = user_agent(true);
            assert!(USER_AGENTS.iter().any(|(_, candidate)| *candidate == agent));
        }
    }

    #[test]
    fn kbs_has_no_origin() {
        let headers = source_headers(Source::Kbs, false);
        assert!(!headers.contains_key("referer"));
    }
}
