use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error("download listing has {found} fields, expected at least {expected}: '{line}'")]
    TooFewFields {
        found: usize,
        expected: usize,
        line: String,
    },
}

const ORIGIN_FIELD: usize = 1;
const SECTION_FIELD: usize = 2;
const NAME_FIELD: usize = 4;
const ARCH_FIELD: usize = 5;
const VERSION_FIELD: usize = 6;

/// `apt download` writes epochs into file names URL-escaped.
pub fn escape_version(version: &str) -> String {
    version.replace(':', "%3a")
}

/// First line of `apt download` output, split at its fixed positions:
///
/// ```text
/// Get:1 http://archive.ubuntu.com/ubuntu focal-updates/main amd64 curl amd64 7.68.0-1ubuntu2.7 [161 kB]
/// 0     1                                2                  3     4    5     6
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadListing {
    pub origin: String,
    pub section: String,
    pub name: String,
    pub architecture: String,
    pub version: String,
}

impl DownloadListing {
    pub fn parse(line: &str) -> Result<Self, ListingError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= VERSION_FIELD {
            return Err(ListingError::TooFewFields {
                found: fields.len(),
                expected: VERSION_FIELD + 1,
                line: line.to_string(),
            });
        }

        Ok(Self {
            origin: fields[ORIGIN_FIELD].to_string(),
            section: fields[SECTION_FIELD].to_string(),
            name: fields[NAME_FIELD].to_string(),
            architecture: fields[ARCH_FIELD].to_string(),
            version: fields[VERSION_FIELD].to_string(),
        })
    }

    /// Name of the `.deb` this listing left in the working directory.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.name,
            escape_version(&self.version),
            self.architecture
        )
    }
}
