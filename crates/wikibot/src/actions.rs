//! Thin, stateless wrappers over [`Bot::request`] and the drivers: they
//! assemble parameters and unwrap response fields, nothing more.

use serde_json::Value;

use crate::client::Bot;
use crate::config::RequestOptions;
use crate::error::Error;
use crate::params::{Param, Params};

/// One revision's worth of a remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub title: String,
    pub namespace: i64,
    pub page_id: i64,
    pub revision_id: i64,
    pub timestamp: String,
    pub content: String,
}

/// Fetch current content for a set of titles, splitting oversized title
/// lists into capped chunks. Missing pages are skipped.
pub async fn read_pages(bot: &Bot, titles: &[String]) -> Result<Vec<RemotePage>, Error> {
    let params = Params::new()
        .with("action", "query")
        .with("titles", titles)
        .with("prop", "revisions")
        .with(
            "rvprop",
            Param::List(vec![
                "content".to_string(),
                "timestamp".to_string(),
                "ids".to_string(),
            ]),
        )
        .with("rvslots", "main");

    let mut pages = Vec::new();
    for outcome in bot.mass_query(params, "titles").await? {
        let response = outcome?;
        let Some(chunk_pages) = response.pointer("/query/pages").and_then(Value::as_array) else {
            continue;
        };
        for page in chunk_pages {
            if page.get("missing").is_some_and(|missing| missing != &Value::Bool(false)) {
                continue;
            }
            let Some(revision) = page
                .pointer("/revisions/0")
                .filter(|revision| revision.is_object())
            else {
                continue;
            };
            let Some(content) = revision
                .pointer("/slots/main/content")
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(page_id) = page.get("pageid").and_then(Value::as_i64) else {
                continue;
            };
            pages.push(RemotePage {
                title: page
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                namespace: page.get("ns").and_then(Value::as_i64).unwrap_or(0),
                page_id,
                revision_id: revision.get("revid").and_then(Value::as_i64).unwrap_or(0),
                timestamp: revision
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: content.to_string(),
            });
        }
    }
    Ok(pages)
}

/// List every page title in a namespace, following continuation up to the
/// engine's call ceiling.
pub async fn all_pages(bot: &Bot, namespace: i64) -> Result<Vec<String>, Error> {
    let params = Params::new()
        .with("action", "query")
        .with("list", "allpages")
        .with("apnamespace", namespace)
        .with("aplimit", bot.config().api_limit() as i64);

    let responses = bot
        .continued_query(params, bot.config().max_continuation_calls)
        .await?;
    Ok(collect_titles(&responses, "/query/allpages"))
}

/// List the page members of a category, following continuation. Accepts the
/// category with or without its `Category:` prefix; when a namespace table is
/// loaded, the title is validated against it first.
pub async fn category_members(bot: &Bot, category: &str) -> Result<Vec<String>, Error> {
    let category_title = if category.starts_with("Category:") {
        category.to_string()
    } else {
        format!("Category:{category}")
    };
    if let Some(map) = bot.namespace_map().await
        && map.new_from_text(&category_title).is_none()
    {
        return Err(Error::ActionFailed {
            action: "categorymembers",
            detail: format!("not a valid category title: {category_title}"),
        });
    }

    let params = Params::new()
        .with("action", "query")
        .with("list", "categorymembers")
        .with("cmtitle", category_title)
        .with("cmtype", "page")
        .with("cmlimit", bot.config().api_limit() as i64);

    let responses = bot
        .continued_query(params, bot.config().max_continuation_calls)
        .await?;
    Ok(collect_titles(&responses, "/query/categorymembers"))
}

/// Replace a page's content. The CSRF token round-trips through the
/// orchestrator's stale-token recovery if needed.
pub async fn edit_page(
    bot: &Bot,
    title: &str,
    text: &str,
    summary: &str,
) -> Result<Value, Error> {
    let token = bot.csrf_token().await?;
    let params = Params::new()
        .with("action", "edit")
        .with("title", title)
        .with("text", text)
        .with("summary", summary)
        .with("bot", true)
        .with("token", token);

    let response = bot.request(params, RequestOptions::post()).await?;
    match response.pointer("/edit/result").and_then(Value::as_str) {
        Some("Success") => Ok(response),
        other => Err(Error::ActionFailed {
            action: "edit",
            detail: format!(
                "{title}: {}",
                other.unwrap_or("no edit result in response")
            ),
        }),
    }
}

/// Delete a page. Deleting a page that does not exist is treated as done.
pub async fn delete_page(bot: &Bot, title: &str, reason: &str) -> Result<(), Error> {
    let token = bot.csrf_token().await?;
    let params = Params::new()
        .with("action", "delete")
        .with("title", title)
        .with("reason", reason)
        .with("token", token);

    match bot.request(params, RequestOptions::post()).await {
        Ok(_) => Ok(()),
        Err(error) if error.code() == Some("missingtitle") => Ok(()),
        Err(error) => Err(error),
    }
}

fn collect_titles(responses: &[Value], pointer: &str) -> Vec<String> {
    let mut titles = Vec::new();
    for response in responses {
        let Some(items) = response.pointer(pointer).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            if let Some(title) = item.get("title").and_then(Value::as_str)
                && !title.trim().is_empty()
            {
                titles.push(title.to_string());
            }
        }
    }
    titles
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::BotConfig;

    fn bot_for(server: &MockServer) -> Bot {
        let config = BotConfig {
            api_url: server.uri(),
            ..BotConfig::default()
        };
        Bot::new(config).expect("bot")
    }

    fn csrf_mock() -> Mock {
        Mock::given(method("GET"))
            .and(query_param("meta", "tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"tokens": {"csrftoken": "csrf+\\"}}
            })))
    }

    #[tokio::test]
    async fn read_pages_parses_revisions_and_skips_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("prop", "revisions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": [
                    {
                        "pageid": 42,
                        "ns": 0,
                        "title": "Alpha",
                        "revisions": [{
                            "revid": 1001,
                            "timestamp": "2026-08-01T00:00:00Z",
                            "slots": {"main": {"content": "alpha text"}}
                        }]
                    },
                    {"ns": 0, "title": "Gone", "missing": true}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        let pages = read_pages(&bot, &["Alpha".to_string(), "Gone".to_string()])
            .await
            .expect("pages");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Alpha");
        assert_eq!(pages[0].page_id, 42);
        assert_eq!(pages[0].revision_id, 1001);
        assert_eq!(pages[0].content, "alpha text");
    }

    #[tokio::test]
    async fn all_pages_accumulates_across_continuations() {
        let server = MockServer::start().await;
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_seen = calls.clone();
        Mock::given(method("GET"))
            .respond_with(move |_request: &wiremock::Request| {
                if calls_seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "continue": {"apcontinue": "Beta", "continue": "-||"},
                        "query": {"allpages": [{"title": "Alpha"}]}
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "query": {"allpages": [{"title": "Beta"}]}
                    }))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        let titles = all_pages(&bot, 0).await.expect("titles");
        assert_eq!(titles, vec!["Alpha".to_string(), "Beta".to_string()]);
    }

    #[tokio::test]
    async fn category_members_normalizes_the_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cmtitle", "Category:Stubs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"categorymembers": [{"title": "Stub one"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        let members = category_members(&bot, "Stubs").await.expect("members");
        assert_eq!(members, vec!["Stub one".to_string()]);
    }

    #[tokio::test]
    async fn edit_page_posts_with_a_token_and_checks_the_result() {
        let server = MockServer::start().await;
        csrf_mock().expect(1).mount(&server).await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=edit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "edit": {"result": "Success", "newrevid": 1002}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        let response = edit_page(&bot, "Sandbox", "new text", "testing")
            .await
            .expect("edit");
        assert_eq!(response.pointer("/edit/newrevid"), Some(&json!(1002)));
    }

    #[tokio::test]
    async fn edit_page_failure_result_is_an_error() {
        let server = MockServer::start().await;
        csrf_mock().mount(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "edit": {"result": "Failure"}
            })))
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        let error = edit_page(&bot, "Sandbox", "text", "summary")
            .await
            .expect_err("must fail");
        assert!(error.to_string().contains("Failure"));
    }

    #[tokio::test]
    async fn delete_page_tolerates_missing_titles() {
        let server = MockServer::start().await;
        csrf_mock().mount(&server).await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bot = bot_for(&server);
        delete_page(&bot, "Never existed", "cleanup")
            .await
            .expect("treated as done");
    }
}
