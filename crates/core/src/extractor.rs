use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

pub type FrontMatter = BTreeMap<String, serde_yaml::Value>;

const DELIMITER: &str = "---";

/// Splits a leading `---` delimited YAML block from `content`.
///
/// Content without a complete block is returned unchanged with an empty mapping.
pub fn extract_frontmatter(content: &str) -> Result<(FrontMatter, String), serde_yaml::Error> {
    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return Ok((FrontMatter::new(), content.to_string())),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
            let parsed = if yaml.trim().is_empty() {
                FrontMatter::new()
            } else {
                serde_yaml::from_str::<FrontMatter>(yaml)?
            };
            return Ok((parsed, body.to_string()));
        }
        offset += line.len();
    }

    Ok((FrontMatter::new(), content.to_string()))
}

/// Reads a scalar front-matter field as text.
pub fn frontmatter_string(frontmatter: &FrontMatter, key: &str) -> Option<String> {
    match frontmatter.get(key)? {
        serde_yaml::Value::String(value) => Some(value.clone()),
        serde_yaml::Value::Number(value) => Some(value.to_string()),
        serde_yaml::Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Removes MDX-only constructs (ESM imports, JSX component tags, admonition fences, MDX
/// comments) while keeping their text children, plain markdown and images.
///
/// Fenced code blocks are left untouched. Never fails: on an internal error the input is
/// returned as-is.
pub fn strip_mdx_components(content: &str) -> String {
    match try_strip_mdx_components(content) {
        Ok(stripped) => stripped,
        Err(error) => {
            warn!(%error, "mdx stripping failed; keeping original content");
            content.to_string()
        }
    }
}

fn try_strip_mdx_components(content: &str) -> Result<String, regex::Error> {
    let esm_re = Regex::new(concat!(
        r#"^\s*(?:import\s+(?:.+\s+from\s+)?['"][^'"]+['"];?"#,
        r#"|export\s+(?:default|const|function|let)\b.*)\s*$"#,
    ))?;
    let component_re = Regex::new(r"</?[A-Z][A-Za-z0-9_.]*(?:\s[^<>]*)?/?>")?;
    let comment_re = Regex::new(r"\{/\*.*?\*/\}")?;
    let admonition_re = Regex::new(r"^\s*:::")?;
    let blank_run_re = Regex::new(r"\n{3,}")?;

    let mut kept = Vec::new();
    let mut fence: Option<&str> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            kept.push(line.to_string());
            continue;
        }

        if let Some(marker) = ["```", "~~~"]
            .into_iter()
            .find(|marker| trimmed.starts_with(marker))
        {
            fence = Some(marker);
            kept.push(line.to_string());
            continue;
        }

        if esm_re.is_match(line) || admonition_re.is_match(line) {
            continue;
        }

        let without_comments = comment_re.replace_all(line, "");
        let cleaned = component_re.replace_all(&without_comments, "");
        if cleaned.trim().is_empty() && !line.trim().is_empty() {
            continue;
        }

        kept.push(cleaned.trim_end().to_string());
    }

    let mut joined = kept.join("\n");
    if content.ends_with('\n') {
        joined.push('\n');
    }

    Ok(blank_run_re.replace_all(&joined, "\n\n").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_is_parsed_and_removed() -> Result<(), Box<dyn std::error::Error>> {
        let content = "---\ntitle: Deploy on AWS\nid: aws\nsidebar_position: 3\n---\n\n# AWS\nBody";
        let (frontmatter, body) = extract_frontmatter(content)?;

        assert_eq!(
            frontmatter_string(&frontmatter, "title").as_deref(),
            Some("Deploy on AWS")
        );
        assert_eq!(frontmatter_string(&frontmatter, "sidebar_position").as_deref(), Some("3"));
        assert_eq!(body, "# AWS\nBody");
        Ok(())
    }

    #[test]
    fn missing_frontmatter_keeps_body() -> Result<(), Box<dyn std::error::Error>> {
        let content = "# Title\n---\nnot front matter";
        let (frontmatter, body) = extract_frontmatter(content)?;
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
        Ok(())
    }

    #[test]
    fn unterminated_frontmatter_is_treated_as_body() -> Result<(), Box<dyn std::error::Error>> {
        let content = "---\ntitle: never closed\n# Heading";
        let (frontmatter, body) = extract_frontmatter(content)?;
        assert!(frontmatter.is_empty());
        assert_eq!(body, content);
        Ok(())
    }

    #[test]
    fn malformed_frontmatter_is_an_error() {
        let content = "---\ntitle: [unclosed\n---\nbody";
        assert!(extract_frontmatter(content).is_err());
    }

    #[test]
    fn mdx_components_are_removed_but_children_survive() {
        let content = "import Tabs from '@theme/Tabs';\nimport TabItem from '@theme/TabItem';\n\n\
<Tabs groupId=\"cloud\">\n<TabItem value=\"aws\" label=\"AWS\">\n\nRun `nebari deploy`.\n\n\
</TabItem>\n</Tabs>\n\n:::note\nKeep **this** note and ![diagram](img/arch.png).\n:::\n";

        let stripped = strip_mdx_components(content);

        assert!(!stripped.contains("import"));
        assert!(!stripped.contains("<Tabs"));
        assert!(!stripped.contains("TabItem"));
        assert!(!stripped.contains(":::"));
        assert!(stripped.contains("Run `nebari deploy`."));
        assert!(stripped.contains("Keep **this** note and ![diagram](img/arch.png)."));
        assert!(!stripped.contains("\n\n\n"));
    }

    #[test]
    fn code_fences_are_left_alone() {
        let content = "```python\nimport os\n<Widget />\n```\n";
        assert_eq!(strip_mdx_components(content), content);
    }

    #[test]
    fn inline_components_keep_surrounding_text() {
        let stripped =
            strip_mdx_components("Click <Highlight color=\"red\">Deploy</Highlight> now {/* x */}");
        assert_eq!(stripped, "Click Deploy now");
    }

    #[test]
    fn lowercase_html_is_kept() {
        let content = "<img src=\"a.png\" /> and <b>bold</b>";
        assert_eq!(strip_mdx_components(content), content);
    }
}
