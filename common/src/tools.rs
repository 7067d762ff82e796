use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::io::{Read as _, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn encode_base64_gz(data: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(Error::Stdio)?;
    let tmp = encoder.finish().map_err(Error::Stdio)?;
    Ok(STANDARD.encode(tmp))
}

/// Decode base64 text, gunzipping the payload when it carries the gzip magic
pub fn base64_gz_decode(data: &[u8]) -> Result<Vec<u8>> {
    let b64decoded = STANDARD.decode(data.trim_ascii()).map_err(Error::Base64DecodeError)?;
    if !b64decoded.starts_with(&GZIP_MAGIC) {
        return Ok(b64decoded);
    }
    let mut gz = GzDecoder::new(&b64decoded[..]);
    let mut out = Vec::new();
    gz.read_to_end(&mut out).map_err(Error::Stdio)?;
    Ok(out)
}
