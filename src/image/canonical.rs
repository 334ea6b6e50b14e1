//! Outlet-specific image URL rewrites.
//!
//! Each rule inspects a parsed URL and returns a rewritten one when it
//! applies. Rules run in order and every applicable rule sees the output of
//! the previous one.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static HANG_FOCUSPOINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)_focuspointcut_\d+x\d+(\.(?:jpe?g|png|webp|avif))$")
        .expect("valid focuspoint regex")
});

/// Query used when moving Guardian media to the resizing host.
const GUARDIAN_RESIZE_QUERY: &str = "width=1000&quality=85&auto=format&fit=max";

type Rule = fn(&Url) -> Option<Url>;

const RULES: &[Rule] = &[guardian_cdn, hang_canonical];

/// Apply every matching rewrite rule. Unparseable input is returned as is.
pub fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let mut changed = false;
    for rule in RULES {
        if let Some(rewritten) = rule(&url) {
            url = rewritten;
            changed = true;
        }
    }
    if changed {
        url.to_string()
    } else {
        raw.to_string()
    }
}

/// `media.guim.co.uk` originals are served through `i.guim.co.uk` with a
/// fixed size and quality. `i.guim.co.uk` URLs are signed and left alone.
fn guardian_cdn(url: &Url) -> Option<Url> {
    let host = url.host_str()?;
    if !host.ends_with("media.guim.co.uk") {
        return None;
    }
    let path = url.path().trim_start_matches('/');
    Url::parse(&format!(
        "https://i.guim.co.uk/img/{}?{}",
        path, GUARDIAN_RESIZE_QUERY
    ))
    .ok()
}

/// Magyar Hang serves the same upload under generated, cropped and keyed
/// variants; reduce them to the original upload path.
fn hang_canonical(url: &Url) -> Option<Url> {
    let host = url.host_str()?;
    if !host.contains("hang.hu") {
        return None;
    }

    let mut out = url.clone();
    out.set_query(None);
    out.set_fragment(None);

    let path = url.path();
    let path = match path.strip_prefix("/data/generated/") {
        Some(rest) => format!("/{}", rest),
        None => path.to_string(),
    };
    let path = HANG_FOCUSPOINT.replace(&path, "$1");
    out.set_path(&path);

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardian_media_rewritten() {
        assert_eq!(
            canonicalize("https://media.guim.co.uk/a1b2/0_0_3000_1800/master/3000.jpg"),
            "https://i.guim.co.uk/img/a1b2/0_0_3000_1800/master/3000.jpg?width=1000&quality=85&auto=format&fit=max"
        );
    }

    #[test]
    fn test_guardian_resizer_untouched() {
        let signed = "https://i.guim.co.uk/img/media/x/master/500.jpg?width=700&s=abc123";
        assert_eq!(canonicalize(signed), signed);
    }

    #[test]
    fn test_hang_generated_and_focuspoint_stripped() {
        assert_eq!(
            canonicalize(
                "https://magyarhang.hu/data/generated/wp-content/uploads/2025/01/kep_focuspointcut_600100010x314100010.jpg?key=abc"
            ),
            "https://magyarhang.hu/wp-content/uploads/2025/01/kep.jpg"
        );
    }

    #[test]
    fn test_hang_plain_upload_only_loses_query() {
        assert_eq!(
            canonicalize("https://hang.hu/uploads/a.webp?w=300"),
            "https://hang.hu/uploads/a.webp"
        );
    }

    #[test]
    fn test_other_hosts_untouched() {
        let url = "https://telex.hu/uploads/img.jpg?w=300&utm_source=rss";
        assert_eq!(canonicalize(url), url);
    }

    #[test]
    fn test_unparseable_returned_as_is() {
        assert_eq!(canonicalize("not a url"), "not a url");
    }
}
