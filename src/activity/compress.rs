use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::StravaError;

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, StravaError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, StravaError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_output_has_magic_and_restores() {
        let packed = gzip(b"<gpx></gpx>").unwrap();
        assert!(crate::activity::detect::is_gzip(&packed));
        assert_eq!(gunzip(&packed).unwrap(), b"<gpx></gpx>");
    }

    #[test]
    fn gunzip_rejects_garbage() {
        let err = gunzip(&[0x1f, 0x8b, 0, 1, 2]).unwrap_err();
        assert_eq!(err.code(), "io_error");
    }
}
