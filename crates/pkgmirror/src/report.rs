use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use pkgmirror_fs::AtomicWriteOptions;
use tera::{Context, Tera};

pub const REPORT_FILE: &str = "index.html";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ display_url }}</title>
</head>
<body>
<h1>Composer repository mirror</h1>
<p>Add this mirror to your <code>composer.json</code>:</p>
<pre>{
    "repositories": [
        { "type": "composer", "url": "{{ display_url }}" },
        { "packagist": false }
    ]
}</pre>
<table>
<tr><th>Upstream</th><td>{{ upstream_url }}</td></tr>
<tr><th>Packages</th><td>{{ packages }}</td></tr>
<tr><th>Last synchronized</th><td>{{ finished_at }}</td></tr>
</table>
</body>
</html>
"#;

#[derive(Debug, Clone)]
pub struct Summary {
    pub display_url:  String,
    pub upstream_url: String,
    pub packages:     usize,
    pub finished_at:  DateTime<Utc>,
}

impl Summary {
    pub fn render(&self) -> Result<String> {
        let mut context = Context::new();
        context.insert("display_url", &self.display_url);
        context.insert("upstream_url", &self.upstream_url);
        context.insert("packages", &self.packages);
        context.insert("finished_at", &self.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        Ok(Tera::one_off(TEMPLATE, &context, true)?)
    }

    /// Write `index.html` into the mirror root.
    pub fn write(&self, root: &Path) -> Result<PathBuf> {
        let path = root.join(REPORT_FILE);
        pkgmirror_fs::atomic_write(&path, self.render()?.as_bytes(), AtomicWriteOptions::new().create_dirs(true))?;
        Ok(path)
    }
}
