//! Interpretation of the tool's structured status report.

use serde::Deserialize;

use super::types::InstanceStatus;

/// Tool status vocabulary and the internal status each value collapses to.
///
/// Anything not listed maps to [`InstanceStatus::Error`].
const STATUS_TABLE: &[(&str, InstanceStatus)] = &[
    ("running", InstanceStatus::Running),
    ("stopped", InstanceStatus::Stopped),
    ("paused", InstanceStatus::Stopped),
];

pub fn map_status(raw: &str) -> InstanceStatus {
    let raw = raw.trim();
    STATUS_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(raw))
        .map_or(InstanceStatus::Error, |(_, status)| *status)
}

/// The parts of `describe --json` the launcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub status: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeLine {
    raw: Option<DescribeRaw>,
}

#[derive(Debug, Deserialize)]
struct DescribeRaw {
    status: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    httpsurl: Option<String>,
    #[serde(default)]
    httpurl: Option<String>,
}

/// Find the report in `describe --json` output.
///
/// The tool may print other JSON log lines around it; the last line carrying
/// a `raw` object with a status wins.
pub fn parse_describe(stdout: &str) -> Option<ToolReport> {
    stdout.lines().rev().find_map(|line| {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        let raw = serde_json::from_str::<DescribeLine>(line).ok()?.raw?;
        let status = raw.status?;
        let urls = if raw.urls.is_empty() {
            raw.httpsurl
                .into_iter()
                .chain(raw.httpurl)
                .filter(|u| !u.is_empty())
                .collect()
        } else {
            raw.urls
        };
        Some(ToolReport { status, urls })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_vocabulary() {
        assert_eq!(map_status("running"), InstanceStatus::Running);
        assert_eq!(map_status(" Running\n"), InstanceStatus::Running);
        assert_eq!(map_status("stopped"), InstanceStatus::Stopped);
        assert_eq!(map_status("paused"), InstanceStatus::Stopped);
    }

    #[test]
    fn unknown_values_fail_safe() {
        for raw in ["starting", "unhealthy", "does not exist", "", "exited"] {
            assert_eq!(map_status(raw), InstanceStatus::Error, "{raw:?}");
        }
    }

    #[test]
    fn parses_report_after_log_lines() {
        let stdout = concat!(
            "{\"level\":\"info\",\"msg\":\"checking\"}\n",
            "not json at all\n",
            "{\"level\":\"info\",\"raw\":{\"name\":\"demo\",\"status\":\"running\",",
            "\"urls\":[\"https://demo.ddev.site:8443\",\"http://demo.ddev.site:8080\"]}}\n",
        );

        let report = parse_describe(stdout).unwrap();

        assert_eq!(report.status, "running");
        assert_eq!(
            report.urls,
            ["https://demo.ddev.site:8443", "http://demo.ddev.site:8080"]
        );
    }

    #[test]
    fn falls_back_to_single_urls() {
        let stdout = r#"{"raw":{"status":"stopped","httpurl":"http://a.test","httpsurl":"https://a.test"}}"#;

        let report = parse_describe(stdout).unwrap();

        assert_eq!(report.urls, ["https://a.test", "http://a.test"]);
    }

    #[test]
    fn unparsable_output_yields_nothing() {
        assert_eq!(parse_describe(""), None);
        assert_eq!(parse_describe("Error: project not found"), None);
        assert_eq!(parse_describe(r#"{"raw":{"urls":[]}}"#), None);
    }
}
