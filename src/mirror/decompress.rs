// src/mirror/decompress.rs

//! Decompression of fetched database files
//!
//! The open-checksum of a database entry covers the decompressed stream.
//! Verification decodes a file only after its compressed checksum matched.

use flate2::read::GzDecoder;
use std::io::Read;
use xz2::read::XzDecoder;

/// Compression format, detected from a location's suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Stored as-is
    None,
    Gzip,
    Xz,
    Zstd,
    /// Compressed with a format we have no decoder for (bzip2, zchunk, ...)
    Unsupported,
}

impl Compression {
    pub fn from_location(location: &str) -> Self {
        if location.ends_with(".gz") {
            Compression::Gzip
        } else if location.ends_with(".xz") {
            Compression::Xz
        } else if location.ends_with(".zst") {
            Compression::Zstd
        } else if location.ends_with(".bz2") || location.ends_with(".zck") {
            Compression::Unsupported
        } else {
            Compression::None
        }
    }
}

/// Decompress `data` according to the suffix of `location`
///
/// Returns `Ok(None)` when the format has no decoder here, in which case the
/// open-checksum cannot be verified.
pub fn decompress(location: &str, data: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    let mut reader: Box<dyn Read + '_> = match Compression::from_location(location) {
        Compression::None => return Ok(Some(data.to_vec())),
        Compression::Unsupported => return Ok(None),
        Compression::Gzip => Box::new(GzDecoder::new(data)),
        Compression::Xz => Box::new(XzDecoder::new(data)),
        Compression::Zstd => Box::new(zstd::Decoder::new(data)?),
    };

    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_detect_compression() {
        assert_eq!(Compression::from_location("repodata/x-primary.xml.gz"), Compression::Gzip);
        assert_eq!(Compression::from_location("repodata/x-primary.xml.xz"), Compression::Xz);
        assert_eq!(Compression::from_location("repodata/x-primary.xml.zst"), Compression::Zstd);
        assert_eq!(
            Compression::from_location("repodata/x-primary.sqlite.bz2"),
            Compression::Unsupported
        );
        assert_eq!(Compression::from_location("repodata/comps.xml"), Compression::None);
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(b"<metadata/>").unwrap();
        let compressed = encoder.finish().unwrap();

        let open = decompress("primary.xml.gz", &compressed).unwrap();
        assert_eq!(open.as_deref(), Some(&b"<metadata/>"[..]));
    }

    #[test]
    fn test_zstd_round_trip() {
        let compressed = zstd::encode_all(&b"<filelists/>"[..], 3).unwrap();
        let open = decompress("filelists.xml.zst", &compressed).unwrap();
        assert_eq!(open.as_deref(), Some(&b"<filelists/>"[..]));
    }

    #[test]
    fn test_uncompressed_and_unsupported() {
        assert_eq!(decompress("comps.xml", b"abc").unwrap(), Some(b"abc".to_vec()));
        assert_eq!(decompress("primary.sqlite.bz2", b"abc").unwrap(), None);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        assert!(decompress("primary.xml.gz", b"definitely not gzip").is_err());
    }
}
