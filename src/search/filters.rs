//! Filter encoding for the image search `tbs` grammar.
//!
//! Every accepted value lives in a static table next to its engine token.
//! Values are lowercased before lookup and must then match an entry exactly;
//! anything else is rejected with [`FilterError::UnsupportedFilterValue`].

use chrono::NaiveDate;

use crate::error::FilterError;
use crate::models::{FilterKey, FilterSet};

pub type TokenTable = &'static [(&'static str, &'static str)];

const COLOR: TokenTable = &[
    ("red", "ic:specific,isc:red"),
    ("orange", "ic:specific,isc:orange"),
    ("yellow", "ic:specific,isc:yellow"),
    ("green", "ic:specific,isc:green"),
    ("teal", "ic:specific,isc:teal"),
    ("blue", "ic:specific,isc:blue"),
    ("purple", "ic:specific,isc:purple"),
    ("pink", "ic:specific,isc:pink"),
    ("white", "ic:specific,isc:white"),
    ("gray", "ic:specific,isc:gray"),
    ("black", "ic:specific,isc:black"),
    ("brown", "ic:specific,isc:brown"),
];

const COLOR_TYPE: TokenTable = &[
    ("full-color", "ic:color"),
    ("black-and-white", "ic:gray"),
    ("transparent", "ic:trans"),
];

const USAGE_RIGHTS: TokenTable = &[
    ("labeled-for-reuse-with-modifications", "sur:fmc"),
    ("labeled-for-reuse", "sur:fc"),
    ("labeled-for-noncommercial-reuse-with-modification", "sur:fm"),
    ("labeled-for-nocommercial-reuse", "sur:f"),
];

const SIZE: TokenTable = &[
    ("large", "isz:l"),
    ("medium", "isz:m"),
    ("icon", "isz:i"),
    (">400*300", "isz:lt,islt:qsvga"),
    (">640*480", "isz:lt,islt:vga"),
    (">800*600", "isz:lt,islt:svga"),
    (">1024*768", "isz:lt,islt:xga"),
    (">2mp", "isz:lt,islt:2mp"),
    (">4mp", "isz:lt,islt:4mp"),
    (">6mp", "isz:lt,islt:6mp"),
    (">8mp", "isz:lt,islt:8mp"),
    (">10mp", "isz:lt,islt:10mp"),
    (">12mp", "isz:lt,islt:12mp"),
    (">15mp", "isz:lt,islt:15mp"),
    (">20mp", "isz:lt,islt:20mp"),
    (">40mp", "isz:lt,islt:40mp"),
    (">70mp", "isz:lt,islt:70mp"),
];

const TYPE: TokenTable = &[
    ("face", "itp:face"),
    ("photo", "itp:photo"),
    ("clipart", "itp:clipart"),
    ("line-drawing", "itp:lineart"),
    ("animated", "itp:animated"),
];

const TIME: TokenTable = &[
    ("past-24-hours", "qdr:d"),
    ("past-7-days", "qdr:w"),
    ("past-month", "qdr:m"),
    ("past-year", "qdr:y"),
];

const ASPECT_RATIO: TokenTable = &[
    ("tall", "iar:t"),
    ("square", "iar:s"),
    ("wide", "iar:w"),
    ("panoramic", "iar:xw"),
];

const FORMAT: TokenTable = &[
    ("jpg", "ift:jpg"),
    ("gif", "ift:gif"),
    ("png", "ift:png"),
    ("bmp", "ift:bmp"),
    ("svg", "ift:svg"),
    ("webp", "ift:webp"),
    ("ico", "ift:ico"),
    ("raw", "ift:craw"),
];

/// Language names mapped to `lr` codes.
const LANGUAGE: TokenTable = &[
    ("arabic", "lang_ar"),
    ("chinese (simplified)", "lang_zh-CN"),
    ("chinese (traditional)", "lang_zh-TW"),
    ("czech", "lang_cs"),
    ("danish", "lang_da"),
    ("dutch", "lang_nl"),
    ("english", "lang_en"),
    ("estonian", "lang_et"),
    ("finnish", "lang_fi"),
    ("french", "lang_fr"),
    ("german", "lang_de"),
    ("greek", "lang_el"),
    ("hebrew", "lang_iw"),
    ("hungarian", "lang_hu"),
    ("icelandic", "lang_is"),
    ("italian", "lang_it"),
    ("japanese", "lang_ja"),
    ("korean", "lang_ko"),
    ("latvian", "lang_lv"),
    ("lithuanian", "lang_lt"),
    ("norwegian", "lang_no"),
    ("portuguese", "lang_pt"),
    ("polish", "lang_pl"),
    ("romanian", "lang_ro"),
    ("russian", "lang_ru"),
    ("spanish", "lang_es"),
    ("swedish", "lang_sv"),
    ("turkish", "lang_tr"),
];

const SAFE_SEARCH: TokenTable = &[("on", "active"), ("off", "")];

/// Token table for keys with a closed value set.
///
/// Returns `None` for keys whose values are parsed (`exact_size`,
/// `time_range`, `site`).
pub fn token_table(key: FilterKey) -> Option<TokenTable> {
    match key {
        FilterKey::Color => Some(COLOR),
        FilterKey::ColorType => Some(COLOR_TYPE),
        FilterKey::UsageRights => Some(USAGE_RIGHTS),
        FilterKey::Size => Some(SIZE),
        FilterKey::Type => Some(TYPE),
        FilterKey::Time => Some(TIME),
        FilterKey::AspectRatio => Some(ASPECT_RATIO),
        FilterKey::Format => Some(FORMAT),
        FilterKey::Language => Some(LANGUAGE),
        FilterKey::SafeSearch => Some(SAFE_SEARCH),
        FilterKey::ExactSize | FilterKey::TimeRange | FilterKey::Site => None,
    }
}

/// Pairs of keys that write the same engine token.
const CONFLICTS: &[(FilterKey, FilterKey)] = &[
    (FilterKey::Color, FilterKey::ColorType),
    (FilterKey::Size, FilterKey::ExactSize),
    (FilterKey::Time, FilterKey::TimeRange),
];

/// Keys that cannot be combined with `key` in one query.
pub fn conflicting_keys(key: FilterKey) -> impl Iterator<Item = FilterKey> {
    CONFLICTS.iter().filter_map(move |(first, second)| {
        if *first == key {
            Some(*second)
        } else if *second == key {
            Some(*first)
        } else {
            None
        }
    })
}

/// Encoded form of a filter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFilters {
    tbs: Vec<String>,
    language: Option<&'static str>,
    safe_search: bool,
    site: Option<String>,
}

impl EncodedFilters {
    /// Comma-joined `tbs` value, or `None` when no `tbs` filter is set.
    pub fn tbs(&self) -> Option<String> {
        if self.tbs.is_empty() {
            None
        } else {
            Some(self.tbs.join(","))
        }
    }

    /// `lr` language code.
    pub fn language(&self) -> Option<&'static str> {
        self.language
    }

    pub fn safe_search(&self) -> bool {
        self.safe_search
    }

    /// `as_sitesearch` restriction.
    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }
}

fn unsupported(key: FilterKey, value: &str) -> FilterError {
    FilterError::UnsupportedFilterValue {
        key,
        value: value.to_string(),
    }
}

/// Look up the engine token for a closed-set filter value.
pub fn lookup(key: FilterKey, value: &str) -> Result<&'static str, FilterError> {
    let table = token_table(key).ok_or_else(|| unsupported(key, value))?;
    let normalized = value.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, token)| *token)
        .ok_or_else(|| unsupported(key, value))
}

/// Resolve a language by display name or by its canonical `lang_*` code.
///
/// The code form is listed by the `filters` command and the `--language` help.
fn lookup_language(value: &str) -> Result<&'static str, FilterError> {
    if let Ok(code) = lookup(FilterKey::Language, value) {
        return Ok(code);
    }
    let normalized = value.trim().to_lowercase();
    LANGUAGE
        .iter()
        .map(|(_, code)| *code)
        .find(|code| code.to_lowercase() == normalized)
        .ok_or_else(|| unsupported(FilterKey::Language, value))
}

/// `W,H` in pixels.
fn encode_exact_size(value: &str) -> Result<String, FilterError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let (width, height) = match parts.as_slice() {
        [w, h] => (w.parse::<u32>().ok(), h.parse::<u32>().ok()),
        _ => (None, None),
    };
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok(format!("isz:ex,iszw:{},iszh:{}", w, h)),
        _ => Err(unsupported(FilterKey::ExactSize, value)),
    }
}

/// `MM/DD/YYYY,MM/DD/YYYY`, earliest first.
fn encode_time_range(value: &str) -> Result<String, FilterError> {
    let parse = |s: &str| NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y").ok();
    let parts: Vec<&str> = value.split(',').collect();
    let (min, max) = match parts.as_slice() {
        [min, max] => (parse(min), parse(max)),
        _ => (None, None),
    };
    match (min, max) {
        (Some(min), Some(max)) if min <= max => Ok(format!(
            "cdr:1,cd_min:{},cd_max:{}",
            min.format("%m/%d/%Y"),
            max.format("%m/%d/%Y")
        )),
        _ => Err(unsupported(FilterKey::TimeRange, value)),
    }
}

/// A bare host name, optionally followed by a path.
fn encode_site(value: &str) -> Result<String, FilterError> {
    let site = value.trim().to_lowercase();
    if site.is_empty() || site.contains(char::is_whitespace) || site.contains("://") {
        return Err(unsupported(FilterKey::Site, value));
    }
    let parsed = url::Url::parse(&format!("http://{}", site))
        .map_err(|_| unsupported(FilterKey::Site, value))?;
    match parsed.host_str() {
        Some(host) if host.contains('.') => Ok(site),
        _ => Err(unsupported(FilterKey::Site, value)),
    }
}

/// Encode a filter set.
///
/// Pure function; errors name the first offending key in engine order.
pub fn encode(filters: &FilterSet) -> Result<EncodedFilters, FilterError> {
    for (first, second) in CONFLICTS {
        if filters.contains(*first) && filters.contains(*second) {
            return Err(FilterError::ConflictingFilters {
                first: *first,
                second: *second,
            });
        }
    }

    let mut encoded = EncodedFilters::default();
    for (key, value) in filters.iter() {
        match key {
            FilterKey::ExactSize => encoded.tbs.push(encode_exact_size(value)?),
            FilterKey::TimeRange => encoded.tbs.push(encode_time_range(value)?),
            FilterKey::Language => encoded.language = Some(lookup_language(value)?),
            FilterKey::SafeSearch => encoded.safe_search = !lookup(key, value)?.is_empty(),
            FilterKey::Site => encoded.site = Some(encode_site(value)?),
            _ => encoded.tbs.push(lookup(key, value)?.to_string()),
        }
    }
    Ok(encoded)
}
