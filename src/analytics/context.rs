use axum::http::HeaderMap;
use url::Url;

/// Country/region headers injected by the hosting platform. Absent outside
/// that platform, in which case geo context degrades to unknown.
const COUNTRY_HEADER: &str = "x-vercel-ip-country";
const REGION_HEADER: &str = "x-vercel-ip-country-region";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub device_type: String,
    pub browser_family: String,
    pub os_family: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoContext {
    pub country_code: Option<String>,
    pub region_code: Option<String>,
}

/// Classifies device type, browser family, and OS family from a User-Agent
/// string via case-insensitive substring matching. Never fails; anything
/// unrecognized falls back to `desktop`/`unknown`.
pub fn parse_device(user_agent: &str) -> DeviceContext {
    let ua = user_agent.to_lowercase();

    // Mobile tokens take precedence over tablet tokens.
    let device_type = if ua.contains("mobile")
        || ua.contains("android")
        || ua.contains("iphone")
        || ua.contains("ipod")
        || ua.contains("blackberry")
        || ua.contains("windows phone")
    {
        "mobile"
    } else if ua.contains("tablet") || ua.contains("ipad") {
        "tablet"
    } else {
        "desktop"
    };

    // Edge and Opera advertise "chrome", and Chrome advertises "safari",
    // so the more specific tokens are checked first.
    let browser_family = if ua.contains("firefox") {
        "firefox"
    } else if ua.contains("edg") {
        "edge"
    } else if ua.contains("opera") || ua.contains("opr") {
        "opera"
    } else if ua.contains("chrome") {
        "chrome"
    } else if ua.contains("safari") {
        "safari"
    } else {
        "unknown"
    };

    // iOS before macOS: iPhone UAs carry "like Mac OS X". Android before
    // Linux: Android UAs carry "Linux".
    let os_family = if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "ios"
    } else if ua.contains("android") {
        "android"
    } else if ua.contains("windows") {
        "windows"
    } else if ua.contains("macintosh") || ua.contains("mac os") {
        "macos"
    } else if ua.contains("linux") {
        "linux"
    } else {
        "unknown"
    };

    DeviceContext {
        device_type: device_type.to_string(),
        browser_family: browser_family.to_string(),
        os_family: os_family.to_string(),
    }
}

/// Reads platform geo headers. Values are lower-cased; missing headers yield
/// `None` rather than an error.
pub fn parse_geo(headers: &HeaderMap) -> GeoContext {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
    };

    GeoContext {
        country_code: read(COUNTRY_HEADER),
        region_code: read(REGION_HEADER),
    }
}

/// Reduces a referrer URL to its hostname. Full referrer URLs are never
/// stored. Absent or malformed input yields `None`.
pub fn referrer_domain(referrer: &str) -> Option<String> {
    let parsed = Url::parse(referrer).ok()?;
    parsed.host_str().map(|host| host.to_lowercase())
}
