//! Kwik embed pages hide the HLS playlist URL inside a
//! `eval(function(p,a,c,k,e,d){...})` packed script.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use reqwest::header::REFERER;

use crate::ResolverError;

/// Referer the Kwik CDN expects on playlist and segment requests
pub const KWIK_REFERER: &str = "https://kwik.cx/";

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

static PACKED_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\}\('(.*?)',\s*(\d+),\s*(\d+),\s*'(.*?)'\.split\('\|'\)")
        .expect("packed args pattern")
});
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word pattern"));
static M3U8: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https.*?m3u8").expect("m3u8 pattern"));

/// Fetch a Kwik embed page and pull the playlist URL out of it
pub async fn extract(
    client: &reqwest::Client,
    embed_url: &str,
    referer: &str,
) -> Result<String, ResolverError> {
    log::debug!("Extracting kwik embed: {}", embed_url);
    let response = client
        .get(embed_url)
        .header(REFERER, referer)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ResolverError::Status {
            url: embed_url.to_string(),
            status,
        });
    }
    let html = response.text().await?;
    find_playlist(&html)
        .ok_or_else(|| ResolverError::Extraction(format!("no playlist in {}", embed_url)))
}

/// Scan every packed script of a page for the first playlist URL
pub fn find_playlist(html: &str) -> Option<String> {
    PACKED_ARGS.captures_iter(html).find_map(|caps| {
        let script = unpack_captures(&caps)
            .map_err(|e| log::warn!("Failed to unpack kwik script: {}", e))
            .ok()?;
        M3U8.find(&script).map(|m| m.as_str().to_string())
    })
}

/// Unpack the first packed script found in `source`
pub fn unpack(source: &str) -> Result<String, ResolverError> {
    let caps = PACKED_ARGS
        .captures(source)
        .ok_or_else(|| ResolverError::Extraction("no packed script".to_string()))?;
    unpack_captures(&caps)
}

fn unpack_captures(caps: &Captures<'_>) -> Result<String, ResolverError> {
    let payload = caps[1].replace("\\'", "'");
    let radix: usize = caps[2]
        .parse()
        .map_err(|_| ResolverError::Extraction(format!("bad radix {}", &caps[2])))?;
    let count: usize = caps[3]
        .parse()
        .map_err(|_| ResolverError::Extraction(format!("bad word count {}", &caps[3])))?;
    if !(2..=ALPHABET.len()).contains(&radix) {
        return Err(ResolverError::Extraction(format!(
            "unsupported radix {}",
            radix
        )));
    }
    let words: Vec<&str> = caps[4].split('|').collect();

    let unpacked = WORD.replace_all(&payload, |word: &Captures<'_>| {
        let token = &word[0];
        match decode_token(token, radix) {
            Some(index) if index < count => match words.get(index) {
                Some(w) if !w.is_empty() => (*w).to_string(),
                _ => token.to_string(),
            },
            _ => token.to_string(),
        }
    });
    Ok(unpacked.into_owned())
}

/// Inverse of the packer's `e(c)` encoder
fn decode_token(token: &str, radix: usize) -> Option<usize> {
    token.bytes().try_fold(0usize, |acc, byte| {
        let digit = ALPHABET.iter().position(|&c| c == byte)?;
        if digit >= radix {
            return None;
        }
        acc.checked_mul(radix)?.checked_add(digit)
    })
}
