use std::fs;
use std::io;
use std::path::Path;

use crate::error::ChartError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
    pub realm: String,
}

/// Basic-auth credentials keyed by realm URI.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    entries: Vec<Credential>,
}

impl Credentials {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads `user:password:uri` lines. A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self, ChartError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no credentials file");
                Ok(Self::empty())
            }
            Err(_) => Err(ChartError::CredentialsRead(path.to_path_buf())),
        }
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let mut parts = line.trim_end().splitn(3, ':');
                let user = parts.next()?;
                let password = parts.next()?;
                let realm = parts.next()?;
                Some(Credential {
                    user: user.to_string(),
                    password: password.to_string(),
                    realm: realm.to_string(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_realm(&self, realm: &str) -> bool {
        self.entries.iter().any(|entry| entry.realm == realm)
    }

    /// Credential whose realm is the longest prefix of `url`.
    pub fn for_url(&self, url: &str) -> Option<&Credential> {
        self.entries
            .iter()
            .filter(|entry| url.starts_with(&entry.realm))
            .max_by_key(|entry| entry.realm.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "pilot:secret:http://www.flugwetter.de/\n\
                        broken-line\n\
                        proxy:p:http://sailer.dynip.lugs.ch/vfrnav/imgcompr.php  \n";

    #[test]
    fn parse_keeps_uri_colons() {
        let creds = Credentials::parse(FILE);
        assert_eq!(creds.len(), 2);
        assert!(creds.has_realm("http://www.flugwetter.de/"));
        let proxy = creds
            .for_url("http://sailer.dynip.lugs.ch/vfrnav/imgcompr.php?src=rad/pm_1.png")
            .unwrap();
        assert_eq!(proxy.user, "proxy");
        assert_eq!(proxy.password, "p");
        assert_eq!(proxy.realm, "http://sailer.dynip.lugs.ch/vfrnav/imgcompr.php");
    }

    #[test]
    fn lookup_prefers_longest_realm() {
        let creds = Credentials::parse(
            "a:1:http://www.flugwetter.de/\nb:2:http://www.flugwetter.de/scripts/\n",
        );
        let hit = creds
            .for_url("http://www.flugwetter.de/scripts/getimg.php?src=rad/pm_1.png")
            .unwrap();
        assert_eq!(hit.user, "b");
        assert!(creds.for_url("http://images.blitzortung.org/").is_none());
    }

    #[test]
    fn missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let creds = Credentials::load(&temp.path().join("absent")).unwrap();
        assert!(creds.is_empty());
    }
}
