//! Interview question lookup backed by a public question bank.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use lol_html::html_content::{Element, TextChunk};
use lol_html::{ElementContentHandlers, HtmlRewriter, Selector, Settings};
use paimon_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolContext, ToolResult};

const TOOL_NAME: &str = "interviewQuestionSearch";

/// Settings for [`InterviewQuestionTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewQuestionConfig {
    /// Whether the tool is offered to the model.
    pub enabled: bool,
    /// Search page URL; the keyword is sent as the `searchText` query parameter.
    pub search_url: String,
    /// CSS selector matching question title elements.
    pub title_selector: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for InterviewQuestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_url: "https://www.mianshiya.com/search/all".to_string(),
            title_selector: ".ant-table-cell > a".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Fetches interview questions matching a keyword.
#[derive(Debug, Clone)]
pub struct InterviewQuestionTool {
    http: reqwest::Client,
    config: InterviewQuestionConfig,
}

impl InterviewQuestionTool {
    /// Creates the tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: InterviewQuestionConfig) -> Result<Self> {
        config
            .title_selector
            .parse::<Selector>()
            .map_err(|e| Error::invalid_config(format!("title_selector: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    async fn fetch(&self, keyword: &str) -> std::result::Result<String, reqwest::Error> {
        self.http
            .get(&self.config.search_url)
            .query(&[("searchText", keyword)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl Tool for InterviewQuestionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Retrieves relevant interview questions based on a keyword. Use this tool when the user \
         asks for interview questions about specific technologies, programming concepts, or \
         job-related topics."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "Keyword to search interview questions for"
                }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let keyword = params
            .get("keyword")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::tool(TOOL_NAME, "missing keyword"))?;

        let html = match self.fetch(keyword).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(keyword = %keyword, error = %e, "Interview question search failed");
                return Ok(ToolResult::error(format!("search failed: {e}")));
            }
        };

        let titles = extract_titles(&html, &self.config.title_selector)?;
        tracing::debug!(keyword = %keyword, count = titles.len(), "Interview questions found");

        if titles.is_empty() {
            return Ok(ToolResult::success(format!(
                "No interview questions found for '{keyword}'"
            )));
        }
        Ok(ToolResult::success(titles.join("\n")).with_data(json!({ "questions": titles })))
    }
}

/// Collects the trimmed text of every element matching `selector`.
///
/// # Errors
///
/// Returns an error if the selector is invalid or the document cannot be
/// processed.
pub fn extract_titles(html: &str, selector: &str) -> Result<Vec<String>> {
    let selector: Selector = selector
        .parse()
        .map_err(|e| Error::invalid_config(format!("title_selector: {e}")))?;

    let titles: Rc<RefCell<Vec<String>>> = Rc::default();
    let on_element = Rc::clone(&titles);
    let on_text = Rc::clone(&titles);

    let handlers = ElementContentHandlers::default()
        .element(move |_el: &mut Element<'_, '_>| {
            on_element.borrow_mut().push(String::new());
            Ok(())
        })
        .text(move |chunk: &mut TextChunk<'_>| {
            if let Some(current) = on_text.borrow_mut().last_mut() {
                current.push_str(chunk.as_str());
            }
            Ok(())
        });

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![(Cow::Owned(selector), handlers)],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    let rewrite_error = |e: lol_html::errors::RewritingError| {
        Error::tool(TOOL_NAME, format!("HTML processing failed: {e}"))
    };
    rewriter.write(html.as_bytes()).map_err(rewrite_error)?;
    rewriter.end().map_err(rewrite_error)?;

    let collected = titles
        .borrow()
        .iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect();
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><table><tbody>
          <tr><td class="ant-table-cell"><a href="/q/1">What is the JVM memory model?</a></td></tr>
          <tr><td class="ant-table-cell"><a href="/q/2">
                How does   HashMap resize?
          </a></td></tr>
          <tr><td class="ant-table-cell"><span>not a title</span></td></tr>
          <tr><td class="other"><a href="/q/3">Unrelated link</a></td></tr>
        </tbody></table></body></html>
    "#;

    #[test]
    fn test_extract_titles() {
        let titles = extract_titles(PAGE, ".ant-table-cell > a").unwrap();
        assert_eq!(
            titles,
            vec!["What is the JVM memory model?", "How does HashMap resize?"]
        );
    }

    #[test]
    fn test_extract_titles_no_match() {
        assert!(extract_titles("<p>empty</p>", ".ant-table-cell > a").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let config = InterviewQuestionConfig {
            title_selector: "<<<".to_string(),
            ..Default::default()
        };
        assert!(InterviewQuestionTool::new(config).is_err());
    }

    #[tokio::test]
    async fn test_missing_keyword_is_tool_error() {
        let tool = InterviewQuestionTool::new(InterviewQuestionConfig::default()).unwrap();
        let ctx = ToolContext::new(paimon_core::ConversationId::default_conversation());

        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
        assert_eq!(tool.definition().name, "interviewQuestionSearch");
    }
}
