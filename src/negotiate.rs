//! `Accept-Encoding` negotiation.

use crate::codec::Codec;

/// A single `Accept-Encoding` entry such as `gzip` or `br;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingToken {
    /// Lower-cased coding name, or `*`.
    pub name: String,
    /// Quality weight in `[0, 1]`.
    pub quality: f32,
}

impl EncodingToken {
    /// Parses one comma-separated entry, returning `None` if it is malformed.
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }

        let mut quality = 1.0;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("q") {
                quality = value.trim().parse::<f32>().ok()?;
                if !(0.0..=1.0).contains(&quality) {
                    return None;
                }
            }
        }

        Some(Self {
            name: name.to_ascii_lowercase(),
            quality,
        })
    }

    fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

/// Parses an `Accept-Encoding` value, skipping malformed entries.
///
/// When a name appears more than once only its first occurrence is kept.
pub fn parse_accept_encoding(header: &str) -> Vec<EncodingToken> {
    let mut tokens: Vec<EncodingToken> = Vec::new();
    for token in header.split(',').filter_map(EncodingToken::parse) {
        if !tokens.iter().any(|t| t.name == token.name) {
            tokens.push(token);
        }
    }
    tokens
}

/// The codecs a server is willing to produce, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedEncodings {
    codecs: Vec<Codec>,
}

impl SupportedEncodings {
    /// Creates a preference list; duplicates after the first are dropped.
    pub fn new(codecs: impl IntoIterator<Item = Codec>) -> Self {
        let mut list = Vec::new();
        for codec in codecs {
            if !list.contains(&codec) {
                list.push(codec);
            }
        }
        Self { codecs: list }
    }

    /// Iterates over the codecs in preference order.
    pub fn iter(&self) -> impl Iterator<Item = Codec> + '_ {
        self.codecs.iter().copied()
    }

    /// Returns true if `codec` is in the list.
    pub fn contains(&self, codec: Codec) -> bool {
        self.codecs.contains(&codec)
    }

    fn rank(&self, codec: Codec) -> usize {
        self.codecs
            .iter()
            .position(|c| *c == codec)
            .unwrap_or(usize::MAX)
    }
}

/// Picks the best codec for an `Accept-Encoding` value.
///
/// Returns `None` when the response should be sent with the identity
/// encoding, which includes requests that carry no `Accept-Encoding` at all.
/// Ties in quality go to the codec listed first in `supported`.
pub fn negotiate(accept_encoding: Option<&str>, supported: &SupportedEncodings) -> Option<Codec> {
    let tokens = parse_accept_encoding(accept_encoding?);

    let mut candidates: Vec<(Codec, f32)> = tokens
        .iter()
        .filter(|t| t.quality > 0.0)
        .filter_map(|t| Codec::from_name(&t.name).map(|codec| (codec, t.quality)))
        .filter(|(codec, _)| supported.contains(*codec))
        .collect();

    // `*` stands for the first supported codec the client did not name
    if let Some(wildcard) = tokens.iter().find(|t| t.is_wildcard() && t.quality > 0.0) {
        let unnamed = supported
            .iter()
            .find(|codec| !tokens.iter().any(|t| t.name == codec.content_encoding()));
        if let Some(codec) = unnamed {
            candidates.push((codec, wildcard.quality));
        }
    }

    candidates
        .into_iter()
        .min_by(|(a, qa), (b, qb)| {
            qb.total_cmp(qa)
                .then_with(|| supported.rank(*a).cmp(&supported.rank(*b)))
        })
        .map(|(codec, _)| codec)
}
