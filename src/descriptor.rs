//! Configuration documents derived from an instance's runtime descriptor.
//!
//! Generation is pure and deterministic: the same descriptor always renders
//! byte-identical text. Writing to disk is a separate step.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::paths::{descriptor_path, DESCRIPTOR_FILE, ENV_FILE, TOOL_DIR};
use crate::structure::StructureKind;

const GENERATED_HEADER: &str = "# Generated by devsite-launcher. Regenerate instead of editing.";

/// Database user, password and schema the tool provisions by default.
pub const DB_CREDENTIAL: &str = "db";

/// Everything needed to describe an instance's runtime to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub name: String,
    pub php_version: String,
    pub structure: StructureKind,
    pub database: DatabaseConfig,
    pub http_port: Option<u16>,
    pub https_port: Option<u16>,
    pub additional_hostnames: Vec<String>,
}

impl RuntimeDescriptor {
    pub fn docroot(&self) -> &'static str {
        self.structure.docroot()
    }

    /// Best guess at the site URL before the tool reports its own.
    pub fn url_hint(&self) -> String {
        let host = format!("{}.ddev.site", self.name);
        match (self.https_port, self.http_port) {
            (Some(port), _) => format!("https://{host}:{port}"),
            (None, Some(port)) => format!("http://{host}:{port}"),
            (None, None) => format!("https://{host}"),
        }
    }
}

/// A rendered document and where it goes, relative to the instance directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub relative_path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolDatabase {
    #[serde(rename = "type")]
    engine: String,
    version: String,
}

/// On-disk shape of the tool descriptor. Field order here is the output order.
#[derive(Debug, Serialize, Deserialize)]
struct ToolConfig {
    name: String,
    #[serde(rename = "type")]
    project_type: String,
    docroot: String,
    php_version: String,
    webserver_type: String,
    database: ToolDatabase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    router_http_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    router_https_port: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    additional_hostnames: Vec<String>,
}

/// Render the tool descriptor (`.ddev/config.yaml`).
pub fn generate(descriptor: &RuntimeDescriptor) -> Result<ConfigDocument> {
    let config = ToolConfig {
        name: descriptor.name.clone(),
        project_type: "php".to_string(),
        docroot: descriptor.docroot().to_string(),
        php_version: descriptor.php_version.clone(),
        webserver_type: "apache-fpm".to_string(),
        database: ToolDatabase {
            engine: descriptor.database.engine.clone(),
            version: descriptor.database.version.clone(),
        },
        router_http_port: descriptor.http_port.map(|p| p.to_string()),
        router_https_port: descriptor.https_port.map(|p| p.to_string()),
        additional_hostnames: descriptor.additional_hostnames.clone(),
    };
    let body = serde_yaml_ng::to_string(&config)?;

    Ok(ConfigDocument {
        relative_path: Path::new(TOOL_DIR).join(DESCRIPTOR_FILE),
        contents: format!("{GENERATED_HEADER}\n{body}"),
    })
}

/// Read a descriptor back from an instance directory.
pub fn parse_descriptor(instance_dir: &Path) -> Result<RuntimeDescriptor> {
    let path = descriptor_path(instance_dir);
    let content = fs::read_to_string(&path)
        .map_err(|e| AppError::io(format!("Failed to read {path:?}: {e}")))?;
    let config: ToolConfig = serde_yaml_ng::from_str(&content)?;

    Ok(RuntimeDescriptor {
        name: config.name,
        php_version: config.php_version,
        structure: StructureKind::from_docroot(&config.docroot),
        database: DatabaseConfig {
            engine: config.database.engine,
            version: config.database.version,
        },
        http_port: config.router_http_port.and_then(|p| p.parse().ok()),
        https_port: config.router_https_port.and_then(|p| p.parse().ok()),
        additional_hostnames: config.additional_hostnames,
    })
}

/// Quote an env value when it carries anything beyond a bare word.
fn env_value(raw: &str) -> String {
    let bare = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | ':'));
    if bare {
        return raw.to_string();
    }
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('$', "\\$");
    format!("\"{escaped}\"")
}

/// Render the flat key/value environment file at the instance root.
pub fn generate_env(descriptor: &RuntimeDescriptor) -> ConfigDocument {
    let port = |p: Option<u16>| p.map(|p| p.to_string()).unwrap_or_default();
    let entries: [(&str, String); 12] = [
        ("INSTANCE_NAME", descriptor.name.clone()),
        ("PHP_VERSION", descriptor.php_version.clone()),
        ("DOCROOT", descriptor.docroot().to_string()),
        ("DB_ENGINE", descriptor.database.engine.clone()),
        ("DB_VERSION", descriptor.database.version.clone()),
        ("DB_HOST", "db".to_string()),
        ("DB_NAME", DB_CREDENTIAL.to_string()),
        ("DB_USER", DB_CREDENTIAL.to_string()),
        ("DB_PASSWORD", DB_CREDENTIAL.to_string()),
        ("HTTP_PORT", port(descriptor.http_port)),
        ("HTTPS_PORT", port(descriptor.https_port)),
        ("SITE_URL", descriptor.url_hint()),
    ];

    let mut contents = String::from(GENERATED_HEADER);
    contents.push('\n');
    for (key, value) in entries {
        contents.push_str(key);
        contents.push('=');
        contents.push_str(&env_value(&value));
        contents.push('\n');
    }

    ConfigDocument {
        relative_path: PathBuf::from(ENV_FILE),
        contents,
    }
}

/// Render front-controller rewrite rules for the document root.
pub fn generate_rewrite_rules(descriptor: &RuntimeDescriptor, entry_point: &str) -> ConfigDocument {
    let docroot = descriptor.docroot();
    let relative_path = if docroot.is_empty() {
        PathBuf::from(".htaccess")
    } else {
        Path::new(docroot).join(".htaccess")
    };
    let contents = format!(
        "{GENERATED_HEADER}\n\
         <IfModule mod_rewrite.c>\n\
         \x20   RewriteEngine On\n\
         \x20   RewriteCond %{{REQUEST_FILENAME}} !-f\n\
         \x20   RewriteCond %{{REQUEST_FILENAME}} !-d\n\
         \x20   RewriteRule ^ {entry_point} [L]\n\
         </IfModule>\n"
    );
    ConfigDocument {
        relative_path,
        contents,
    }
}

/// Write a document under `instance_dir`, replacing any previous version atomically.
pub fn write_document(instance_dir: &Path, document: &ConfigDocument) -> Result<PathBuf> {
    let target = instance_dir.join(&document.relative_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create {parent:?}: {e}")))?;
    }
    let tmp = target.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, &document.contents)
        .map_err(|e| AppError::io(format!("Failed to write {tmp:?}: {e}")))?;
    fs::rename(&tmp, &target)
        .map_err(|e| AppError::io(format!("Failed to move {tmp:?} to {target:?}: {e}")))?;
    Ok(target)
}

/// Write a document only when nothing exists at its path yet.
pub fn write_document_if_absent(
    instance_dir: &Path,
    document: &ConfigDocument,
) -> Result<Option<PathBuf>> {
    if instance_dir.join(&document.relative_path).exists() {
        return Ok(None);
    }
    write_document(instance_dir, document).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> RuntimeDescriptor {
        RuntimeDescriptor {
            name: "demo-site".to_string(),
            php_version: "8.3".to_string(),
            structure: StructureKind::NestedPublic,
            database: DatabaseConfig {
                engine: "mariadb".to_string(),
                version: "11.4".to_string(),
            },
            http_port: Some(8080),
            https_port: Some(8443),
            additional_hostnames: vec!["admin.demo".to_string()],
        }
    }

    #[test]
    fn generate_is_deterministic() {
        let first = generate(&descriptor()).unwrap();
        let second = generate(&descriptor()).unwrap();
        assert_eq!(first, second);
        assert_eq!(generate_env(&descriptor()), generate_env(&descriptor()));
    }

    #[test]
    fn descriptor_fields_in_fixed_order() {
        let doc = generate(&descriptor()).unwrap();
        let text = &doc.contents;

        assert_eq!(doc.relative_path, Path::new(".ddev").join("config.yaml"));
        let positions: Vec<usize> = [
            "name:",
            "type: php",
            "docroot: public",
            "php_version:",
            "database:",
            "router_http_port:",
            "router_https_port:",
            "additional_hostnames:",
        ]
        .iter()
        .map(|needle| text.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
    }

    #[test]
    fn yaml_significant_values_are_quoted() {
        let mut d = descriptor();
        d.php_version = "8.3: yes # comment".to_string();
        d.additional_hostnames = vec!["*.wild".to_string()];

        let doc = generate(&d).unwrap();
        let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(&doc.contents).unwrap();

        assert_eq!(parsed["php_version"].as_str(), Some("8.3: yes # comment"));
        assert_eq!(parsed["additional_hostnames"][0].as_str(), Some("*.wild"));
    }

    #[test]
    fn written_descriptor_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path(), &generate(&descriptor()).unwrap()).unwrap();

        assert_eq!(parse_descriptor(dir.path()).unwrap(), descriptor());
    }

    #[test]
    fn ports_are_omitted_until_allocated() {
        let mut d = descriptor();
        d.http_port = None;
        d.https_port = None;

        let doc = generate(&d).unwrap();

        assert!(!doc.contents.contains("router_http_port"));
    }

    #[test]
    fn env_file_quotes_unsafe_values() {
        let mut d = descriptor();
        d.php_version = "8.3 \"beta\"".to_string();

        let env = generate_env(&d);

        assert!(env.contents.contains("INSTANCE_NAME=demo-site\n"));
        assert!(env.contents.contains("PHP_VERSION=\"8.3 \\\"beta\\\"\"\n"));
        assert!(env.contents.contains("HTTPS_PORT=8443\n"));
        assert!(env.contents.contains("SITE_URL=https://demo-site.ddev.site:8443\n"));
    }

    #[test]
    fn rewrite_rules_live_in_docroot() {
        let doc = generate_rewrite_rules(&descriptor(), "index.php");
        assert_eq!(doc.relative_path, Path::new("public").join(".htaccess"));
        assert!(doc.contents.contains("RewriteRule ^ index.php [L]"));
    }

    #[test]
    fn write_if_absent_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(dir.path().join("public").join(".htaccess"), "custom").unwrap();

        let written =
            write_document_if_absent(dir.path(), &generate_rewrite_rules(&descriptor(), "index.php"))
                .unwrap();

        assert!(written.is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join("public").join(".htaccess")).unwrap(),
            "custom"
        );
    }
}
