use std::path::{Path, PathBuf};

use tera::Tera;
use tracing::{debug, info};

use crate::error::MapError;

const BUILTIN: [(&str, &str); 3] = [
    ("map.html", include_str!("../templates/map.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("notebook.html", include_str!("../templates/notebook.html")),
];

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Templates compiled into the binary.
    pub fn builtin() -> Result<Self, MapError> {
        Ok(Self { tera: builtin_tera()? })
    }

    /// Templates from the `.html` files under `base_path`, named by their
    /// path relative to it. The built-in set fills in any name the directory
    /// does not provide.
    pub fn new(base_path: PathBuf) -> Result<Self, MapError> {
        if !base_path.is_dir() {
            debug!("template dir {} not found, using built-in templates", base_path.display());
            return Self::builtin();
        }

        let mut files = Vec::new();
        collect_html(&base_path, &base_path, &mut files)?;
        files.sort();

        let mut tera = Tera::default();
        if !files.is_empty() {
            let names: Vec<&str> = files.iter().map(|(_, name)| name.as_str()).collect();
            info!("template overrides from {}: {:?}", base_path.display(), names);
            let entries: Vec<(&Path, Option<&str>)> =
                files.iter().map(|(path, name)| (path.as_path(), Some(name.as_str()))).collect();
            tera.add_template_files(entries)?;
        }
        tera.extend(&builtin_tera()?)?;

        Ok(Self { tera })
    }

    pub fn from_dir_or_builtin(base_path: Option<&Path>) -> Result<Self, MapError> {
        match base_path {
            Some(p) => Self::new(p.to_path_buf()),
            None => Self::builtin(),
        }
    }

    pub fn render(&self, template_name: &str, context: &tera::Context) -> Result<String, MapError> {
        self.tera.render(template_name, context).map_err(|e| {
            let loaded = self.tera.get_template_names().collect::<Vec<_>>();
            let err = MapError::from(e);
            MapError::Template(format!("{}. Requested: '{}'. Loaded: {:?}", err, template_name, loaded))
        })
    }
}

/// Walk `dir` for `.html` files, pairing each path with its name relative to `root`.
fn collect_html(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, String)>) -> Result<(), MapError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_html(root, &path, out)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("html") {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            let name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
            out.push((path.clone(), name));
        }
    }
    Ok(())
}

fn builtin_tera() -> Result<Tera, MapError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(BUILTIN.to_vec())?;
    Ok(tera)
}

/// Serialize a value for embedding inside a `<script>` element.
///
/// `<`, `>` and `&` only occur inside JSON strings, so they are written as
/// `\u` escapes. The output then contains no markup at all and cannot
/// close the element or switch the parser into a double-escaped state.
pub fn script_json<T: serde::Serialize>(value: &T) -> Result<String, MapError> {
    let json = serde_json::to_string(value).map_err(|e| MapError::Template(e.to_string()))?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            c => out.push(c),
        }
    }
    Ok(out)
}
