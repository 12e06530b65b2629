//! URLs peers use to reach the delivery endpoint

/// Path segment for toolchain bundles
pub const COMPILER_SEGMENT: &str = "compiler";

/// Path segment for task bundles and result uploads
pub const TASKS_SEGMENT: &str = "tasks";

/// Base URL of the delivery endpoint as seen from peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUrls {
    base: String,
}

impl DeliveryUrls {
    pub fn new(host: &str, port: u16, prefix: &str) -> Self {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let prefix = prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            format!("http://{}:{}", host, port)
        } else {
            format!("http://{}:{}/{}", host, port, prefix)
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn compiler(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.base, COMPILER_SEGMENT, hash)
    }

    pub fn tasks(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.base, TASKS_SEGMENT, hash)
    }

    /// Where a peer PUTs the output archive of a task bundle
    pub fn upload(&self, hash: &str, archive: &str) -> String {
        format!("{}/{}", self.tasks(hash), archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let urls = DeliveryUrls::new("192.168.1.20", 6000, "requestID");
        assert_eq!(urls.base(), "http://192.168.1.20:6000/requestID");
        assert_eq!(urls.compiler("ab12"), "http://192.168.1.20:6000/requestID/compiler/ab12");
        assert_eq!(urls.tasks("ab12"), "http://192.168.1.20:6000/requestID/tasks/ab12");
        assert_eq!(
            urls.upload("ab12", "output.zip"),
            "http://192.168.1.20:6000/requestID/tasks/ab12/output.zip"
        );
    }

    #[test]
    fn test_prefix_slashes_and_ipv6() {
        let urls = DeliveryUrls::new("::1", 8080, "/golem/");
        assert_eq!(urls.base(), "http://[::1]:8080/golem");

        let bare = DeliveryUrls::new("builder.local", 80, "");
        assert_eq!(bare.tasks("h"), "http://builder.local:80/tasks/h");
    }
}
