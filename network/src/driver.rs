use crate::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Tap,
    Bridge,
    Other,
}

/// One kernel network interface as seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    pub kind: LinkKind,
    /// Interface index of the bridge this link is enslaved to.
    pub master: Option<u32>,
}

impl LinkInfo {
    pub fn is_tap(&self) -> bool {
        self.kind == LinkKind::Tap
    }

    pub fn is_bridge(&self) -> bool {
        self.kind == LinkKind::Bridge
    }
}

/// Read-only view of the host's network interfaces.
pub trait LinkDriver: Send + Sync {
    fn list_links(&self) -> Result<Vec<LinkInfo>, NetworkError>;
}

/// Fixed link table, for tests and offline inspection.
#[derive(Debug, Clone, Default)]
pub struct StaticLinkDriver {
    links: Vec<LinkInfo>,
}

impl StaticLinkDriver {
    pub fn new(links: Vec<LinkInfo>) -> Self {
        Self { links }
    }
}

impl LinkDriver for StaticLinkDriver {
    fn list_links(&self) -> Result<Vec<LinkInfo>, NetworkError> {
        Ok(self.links.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_driver_lists_links() {
        let links = vec![
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
        ];
        let driver: Box<dyn LinkDriver> = Box::new(StaticLinkDriver::new(links.clone()));

        let listed = driver.list_links().unwrap();
        assert_eq!(listed, links);
        assert!(listed[0].is_bridge());
        assert!(listed[1].is_tap());
    }
}
