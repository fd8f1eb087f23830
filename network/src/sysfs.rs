use crate::driver::{LinkDriver, LinkInfo, LinkKind};
use crate::error::NetworkError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

// IFF_TAP from linux/if_tun.h
const IFF_TAP: u32 = 0x0002;

/// Enumerates links from `/sys/class/net` without touching netlink.
///
/// Each interface directory yields its `ifindex`; a `tun_flags` file with
/// the tap bit marks a tap, a `bridge/` directory marks a bridge, and a
/// `master` link points at the enslaving bridge.
#[derive(Debug, Clone)]
pub struct SysfsLinkDriver {
    root: PathBuf,
}

impl SysfsLinkDriver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_link(&self, dir: &Path, name: String) -> Result<Option<LinkInfo>, NetworkError> {
        let Some(index) = read_index(&dir.join("ifindex"))? else {
            tracing::debug!(name = %name, "Skipping entry without ifindex");
            return Ok(None);
        };

        let kind = if dir.join("bridge").is_dir() {
            LinkKind::Bridge
        } else {
            match read_trimmed(&dir.join("tun_flags"))? {
                Some(flags) => {
                    let flags = parse_flags(&flags).ok_or_else(|| {
                        NetworkError::InvalidLink(format!("{}: tun_flags {}", name, flags))
                    })?;
                    if flags & IFF_TAP != 0 {
                        LinkKind::Tap
                    } else {
                        LinkKind::Other
                    }
                }
                None => LinkKind::Other,
            }
        };

        let master = read_index(&dir.join("master").join("ifindex"))?;

        Ok(Some(LinkInfo {
            index,
            name,
            kind,
            master,
        }))
    }
}

impl Default for SysfsLinkDriver {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl LinkDriver for SysfsLinkDriver {
    fn list_links(&self) -> Result<Vec<LinkInfo>, NetworkError> {
        let mut links = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(link) = self.read_link(&path, name)? {
                links.push(link);
            }
        }

        links.sort_by_key(|link| link.index);
        tracing::debug!(root = %self.root.display(), count = links.len(), "Listed links");
        Ok(links)
    }
}

fn read_trimmed(path: &Path) -> Result<Option<String>, NetworkError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_index(path: &Path) -> Result<Option<u32>, NetworkError> {
    let Some(content) = read_trimmed(path)? else {
        return Ok(None);
    };
    content
        .parse()
        .map(Some)
        .map_err(|_| NetworkError::InvalidLink(format!("{}: {:?}", path.display(), content)))
}

fn parse_flags(value: &str) -> Option<u32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn add_link(root: &Path, name: &str, index: u32) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ifindex"), format!("{}\n", index)).unwrap();
        dir
    }

    #[test]
    fn test_list_links_from_sysfs_tree() {
        let root = TempDir::new().unwrap();

        add_link(root.path(), "lo", 1);

        let bridge = add_link(root.path(), "brvm-1", 4);
        fs::create_dir(bridge.join("bridge")).unwrap();

        let tap = add_link(root.path(), "tpvm-1", 5);
        fs::write(tap.join("tun_flags"), "0x1002\n").unwrap();
        symlink(&bridge, tap.join("master")).unwrap();

        let tun = add_link(root.path(), "tun0", 6);
        fs::write(tun.join("tun_flags"), "0x1001\n").unwrap();

        fs::write(root.path().join("bonding_masters"), "").unwrap();

        let links = SysfsLinkDriver::new(root.path()).list_links().unwrap();
        assert_eq!(
            links,
            vec![
                LinkInfo {
                    index: 1,
                    name: "lo".to_string(),
                    kind: LinkKind::Other,
                    master: None,
                },
                LinkInfo {
                    index: 4,
                    name: "brvm-1".to_string(),
                    kind: LinkKind::Bridge,
                    master: None,
                },
                LinkInfo {
                    index: 5,
                    name: "tpvm-1".to_string(),
                    kind: LinkKind::Tap,
                    master: Some(4),
                },
                LinkInfo {
                    index: 6,
                    name: "tun0".to_string(),
                    kind: LinkKind::Other,
                    master: None,
                },
            ]
        );
    }

    #[test]
    fn test_garbage_ifindex_is_an_error() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("eth0");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("ifindex"), "abc").unwrap();

        let result = SysfsLinkDriver::new(root.path()).list_links();
        assert!(matches!(result, Err(NetworkError::InvalidLink(_))));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let root = TempDir::new().unwrap();
        let driver = SysfsLinkDriver::new(root.path().join("absent"));
        assert!(matches!(driver.list_links(), Err(NetworkError::Io(_))));
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(parse_flags("0x1002"), Some(0x1002));
        assert_eq!(parse_flags("4098"), Some(4098));
        assert_eq!(parse_flags("0xzz"), None);
    }
}
