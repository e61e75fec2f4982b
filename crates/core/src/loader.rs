use crate::extractor::{extract_frontmatter, frontmatter_string, strip_mdx_components, FrontMatter};
use crate::models::{ContentDirectory, Document, DocumentMetadata, IngestionOptions, SourceKind};
use crate::IngestError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Marketing copy of the project homepage, indexed as a pseudo-document.
pub const WEBSITE_COPY: &str = concat!(
    "# Nebari - Your Open Source Data Science Platform\n",
    "Built for scale, designed for collaboration.\n",
    "\n## Why Choose Nebari?\n",
    "\n### GitOps Approach\n",
    "Integrated DevOps and security best practices for a robust deployment ",
    "and better infrastructure management.\n",
    "\n### Opinionated\n",
    "Designed with integrations and configurations selected from real-world ",
    "experience, so that you can use it out-of-the-box for a variety of data ",
    "science workloads.\n",
    "\n### Rooted in Open Source\n",
    "Developed with community in mind and under a BSD-3 license, we strive to ",
    "contribute back to the upstream OSS projects wherever possible.\n",
    "\n### Collaboration-First\n",
    "Large teams can share work and iterate quickly with reproducible ",
    "environments. Administrators can manage team resources effectively, ",
    "all from the same platform.\n",
    "\n### Dask Powered\n",
    "Nebari ships with Dask so you can scale your work to terabytes of data, ",
    "leverage cloud instances with GPUs, and take advantage of adaptive scaling ",
    "for managing costs.\n",
    "\n### Your Favorite Tools\n",
    "Built with open source infrastructure and tools to give you complete ",
    "flexibility over your deployment and fit your team's specific needs.\n",
    "\n## Deploy Anywhere\n",
    "Try Nebari on your local machine or deploy it on your cloud of choice. ",
    "Nebari is designed to be flexible, extensible, and vendor-agnostic.\n\n",
    "Nebari can be seamlessly deployed to the major public cloud providers, ",
    "including AWS, Azure, and GCP.\n",
    "\n## Integrations\n",
    "Nebari comes with out-of-the-box integrations to multiple tools in the ",
    "data science ecosystem:\n",
    "- conda-store\n",
    "- VSCode\n",
    "- Grafana\n",
    "- Jitsi\n",
    "- Argo Workflows\n",
    "- JupyterHub\n",
);

const WEBSITE_DESCRIPTION: &str =
    "Your open source data science platform. Built for scale, designed for collaboration.";

/// Directory under the documentation root that holds every content directory.
const CONTENT_ROOT: &str = "docs";

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Lists markdown files under `folder` in path order. Entries the walk cannot read are
/// logged and pushed onto `skipped`.
pub fn discover_markdown_files(folder: &Path, skipped: &mut Vec<SkippedFile>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for item in WalkDir::new(folder) {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().unwrap_or(folder).to_path_buf();
                warn!(path = %path.display(), %error, "cannot read directory entry");
                skipped.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let is_markdown = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("mdx"));

        if is_markdown {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Scans the documentation tree under `root`.
///
/// Unreadable or malformed files are recorded in [`LoadReport::skipped_files`] and the scan
/// goes on. A root without a `docs` directory yields an empty report.
pub fn load_documents(root: &Path, options: &IngestionOptions) -> LoadReport {
    let mut report = LoadReport::default();
    let base = root.join(CONTENT_ROOT);

    if !base.is_dir() {
        warn!(path = %base.display(), "documentation root not found");
        return report;
    }

    for directory in &options.content_directories {
        load_content_directory(root, directory, &mut report);
    }

    if options.include_readme {
        let readme = base.join("README.md");
        if readme.is_file() {
            match load_readme(&readme) {
                Ok(document) => {
                    info!(path = %readme.display(), "found root readme");
                    report.documents.push(document);
                }
                Err(error) => skip(&mut report, readme, error),
            }
        }
    }

    if options.include_website_copy {
        report.documents.push(website_document(&base));
    }

    report
}

fn load_content_directory(root: &Path, directory: &ContentDirectory, report: &mut LoadReport) {
    let folder = root.join(&directory.relative_path);
    if !folder.is_dir() {
        info!(directory = %directory.name, "skipping content directory (not found)");
        return;
    }

    let files = discover_markdown_files(&folder, &mut report.skipped_files);
    info!(directory = %directory.name, files = files.len(), "scanning content directory");

    for path in files {
        match load_file(&folder, &path, directory.source) {
            Ok(document) => report.documents.push(document),
            Err(error) => skip(report, path, error),
        }
    }
}

fn skip(report: &mut LoadReport, path: PathBuf, error: IngestError) {
    warn!(path = %path.display(), %error, "skipping file");
    report.skipped_files.push(SkippedFile {
        path,
        reason: error.to_string(),
    });
}

fn read_markdown(path: &Path) -> Result<(FrontMatter, String), IngestError> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8(bytes)
        .map_err(|error| IngestError::Decode(format!("{}: {error}", path.display())))?;

    extract_frontmatter(&content).map_err(|error| IngestError::FrontMatter {
        path: path.display().to_string(),
        details: error.to_string(),
    })
}

fn load_file(folder: &Path, path: &Path, source: SourceKind) -> Result<Document, IngestError> {
    let (frontmatter, body) = read_markdown(path)?;
    let content = if is_mdx(path) {
        strip_mdx_components(&body)
    } else {
        body
    };

    let relative = path
        .strip_prefix(folder)
        .map_err(|_| IngestError::OutsideRoot(path.display().to_string()))?;
    let file_path = relative_file_path(relative);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(Document {
        content,
        metadata: DocumentMetadata {
            source,
            category: infer_category(relative, source),
            title: frontmatter_string(&frontmatter, "title").unwrap_or_else(|| stem.clone()),
            description: frontmatter_string(&frontmatter, "description").unwrap_or_default(),
            id: frontmatter_string(&frontmatter, "id").unwrap_or(stem),
            source_file: path.display().to_string(),
            file_path,
        },
    })
}

fn load_readme(path: &Path) -> Result<Document, IngestError> {
    let (frontmatter, content) = read_markdown(path)?;

    Ok(Document {
        content,
        metadata: DocumentMetadata {
            source: SourceKind::Documentation,
            file_path: "README.md".to_string(),
            category: "root".to_string(),
            title: frontmatter_string(&frontmatter, "title")
                .unwrap_or_else(|| "README".to_string()),
            description: frontmatter_string(&frontmatter, "description").unwrap_or_default(),
            id: frontmatter_string(&frontmatter, "id").unwrap_or_else(|| "readme".to_string()),
            source_file: path.display().to_string(),
        },
    })
}

fn website_document(base: &Path) -> Document {
    Document {
        content: WEBSITE_COPY.to_string(),
        metadata: DocumentMetadata {
            source: SourceKind::Website,
            file_path: "index.jsx".to_string(),
            category: "home".to_string(),
            title: "Nebari Homepage".to_string(),
            description: WEBSITE_DESCRIPTION.to_string(),
            id: "homepage".to_string(),
            source_file: base
                .join("src")
                .join("pages")
                .join("index.jsx")
                .display()
                .to_string(),
        },
    }
}

fn is_mdx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mdx"))
}

/// First path segment for nested files, the directory's source type otherwise.
pub fn infer_category(relative: &Path, source: SourceKind) -> String {
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(first), Some(_)) => first.as_os_str().to_string_lossy().to_string(),
        _ => source.as_str().to_string(),
    }
}

fn relative_file_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
