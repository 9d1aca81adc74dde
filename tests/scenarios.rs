//! End-to-end response scenarios against an in-memory document.

mod common;

use std::sync::Arc;

use common::{Recorder, Reply, Server, partial};
use parking_lot::Mutex;
use partial_ajax::{
    Document, Engine, ErrorEvent, ErrorKind, MemoryDocument, RequestOptions, Result,
};

struct Harness {
    server: Server,
    document: MemoryDocument,
    engine: Engine,
    recorder: Recorder,
    errors: Arc<Mutex<Vec<ErrorEvent>>>,
}

impl Harness {
    fn new(html: &str) -> Self {
        Self::with_document(MemoryDocument::from_html(html))
    }

    fn with_document(document: MemoryDocument) -> Self {
        common::init_tracing();
        let server = Server::new(|_| Reply::empty());
        let engine = common::engine(&server, &document);
        let recorder = Recorder::attach(&engine);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        engine.add_on_error(move |event| sink.lock().push(event.clone()));

        Self {
            server,
            document,
            engine,
            recorder,
            errors,
        }
    }

    /// Sends one request answered with `body` and waits for its terminal event.
    async fn round_trip(&self, body: impl Into<String>) -> anyhow::Result<Vec<String>> {
        self.server.script(Reply::ok(body));
        let before = self.recorder.events().len();
        self.engine.request("trigger", None, RequestOptions::new())?;
        let events = self.recorder.wait_for(before + 3).await;
        Ok(events[before..].to_vec())
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_eval_runs_exactly_once() -> anyhow::Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&marks);
    let document = MemoryDocument::new().with_script_hook(Arc::new(
        move |script: &str, _: &MemoryDocument| -> Result<()> {
            if let Some(value) = script.strip_prefix("mark=") {
                sink.lock().push(value.trim_matches('\'').to_string());
            }
            Ok(())
        },
    ));
    let harness = Harness::with_document(document);

    let events = harness
        .round_trip(concat!(
            "<partial-response><changes>",
            "<eval><![CDATA[mark='ok']]></eval>",
            "</changes></partial-response>"
        ))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert_eq!(*marks.lock(), vec!["ok"]);
    assert_eq!(harness.document.executed_scripts(), vec!["mark='ok'"]);
    Ok(())
}

#[tokio::test]
async fn test_update_and_inserts_keep_payload_order() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="list"><div id="changesArea">original</div></div>"#);

    harness
        .round_trip(partial(concat!(
            r#"<update id="changesArea"><![CDATA[X]]></update>"#,
            r#"<insert id="i1" before="changesArea"><![CDATA[<p id="i1">Y</p>]]></insert>"#,
            r#"<insert id="i2" after="changesArea"><![CDATA[<p id="i2">Z</p>]]></insert>"#,
        )))
        .await?;

    assert_eq!(
        harness.document.child_ids("list"),
        vec!["i1", "changesArea", "i2"]
    );
    assert_eq!(harness.document.inner_html("changesArea").as_deref(), Some("X"));
    assert_eq!(harness.document.inner_html("i1").as_deref(), Some("Y"));
    assert_eq!(harness.document.inner_html("i2").as_deref(), Some("Z"));
    Ok(())
}

#[tokio::test]
async fn test_delete_is_idempotent() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="deletable">bye</div><div id="stays"></div>"#);
    let payload = partial(r#"<delete id="deletable"/>"#);

    let first = harness.round_trip(payload.clone()).await?;
    assert!(!harness.document.contains("deletable"));
    assert!(harness.document.contains("stays"));

    let mutations = harness.document.mutation_count();
    let second = harness.round_trip(payload).await?;

    assert_eq!(first.last(), second.last());
    assert_eq!(second.last().map(String::as_str), Some("trigger:success"));
    assert_eq!(harness.document.mutation_count(), mutations);
    assert!(harness.errors.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_server_error_blocks_every_mutation() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="a">keep</div>"#);
    let mutations = harness.document.mutation_count();

    let events = harness
        .round_trip(concat!(
            "<partial-response>",
            r#"<changes><update id="a"><![CDATA[changed]]></update></changes>"#,
            "<error><error-name>E1</error-name></error>",
            "</partial-response>"
        ))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:serverError"));
    assert_eq!(harness.document.mutation_count(), mutations);
    assert_eq!(harness.document.inner_html("a").as_deref(), Some("keep"));

    let errors = harness.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].status, ErrorKind::ServerError);
    assert_eq!(errors[0].server_error_name.as_deref(), Some("E1"));
    Ok(())
}

#[tokio::test]
async fn test_non_xml_payload_is_malformed() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="a">keep</div>"#);
    let mutations = harness.document.mutation_count();

    let events = harness.round_trip(">>>> xxxx >YYYY-!->>>").await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:malformedXML"));
    assert_eq!(harness.document.mutation_count(), mutations);

    let errors = harness.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].status, ErrorKind::MalformedXml);
    assert_eq!(errors[0].response_text.as_deref(), Some(">>>> xxxx >YYYY-!->>>"));
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_embedded_script_not_replayed_by_later_changes() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="widget"></div>"#);

    harness
        .round_trip(partial(
            r#"<update id="widget"><![CDATA[<b>ready</b><script>counter++</script>]]></update>"#,
        ))
        .await?;
    assert_eq!(harness.document.executed_scripts(), vec!["counter++"]);

    harness
        .round_trip(partial(concat!(
            r#"<attributes id="widget"><attribute name="class" value="on"/></attributes>"#,
            r#"<insert id="n" after="widget"><![CDATA[<hr id="n">]]></insert>"#,
        )))
        .await?;

    assert_eq!(harness.document.attribute("widget", "class").as_deref(), Some("on"));
    assert_eq!(harness.document.executed_scripts(), vec!["counter++"]);
    Ok(())
}

#[tokio::test]
async fn test_body_replacement_with_unescaped_markup() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="old">old</div>"#);

    let events = harness
        .round_trip(concat!(
            "<partial-response><changes>",
            r#"<update id="javax.faces.ViewBody"><![CDATA[<body class="fresh"><p id="new">a & b<br></p></body>]]></update>"#,
            "</changes></partial-response>"
        ))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert!(!harness.document.contains("old"));
    assert!(harness.document.contains("new"));
    assert_eq!(harness.document.body_attribute("class").as_deref(), Some("fresh"));
    Ok(())
}

#[tokio::test]
async fn test_missing_update_target_is_skipped() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="present"></div>"#);

    let events = harness
        .round_trip(partial(concat!(
            r#"<update id="ghost"><![CDATA[lost]]></update>"#,
            r#"<update id="present"><![CDATA[found]]></update>"#,
        )))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert_eq!(harness.document.inner_html("present").as_deref(), Some("found"));
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_anchor_fails_response() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="a"></div>"#);

    let events = harness
        .round_trip(partial(concat!(
            r#"<update id="a"><![CDATA[first]]></update>"#,
            r#"<insert id="n" before="ghost"><![CDATA[<p id="n"></p>]]></insert>"#,
        )))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:clientError"));
    assert!(!harness.document.contains("n"));
    Ok(())
}

#[tokio::test]
async fn test_redirect_navigates() -> anyhow::Result<()> {
    let harness = Harness::new("");

    let events = harness
        .round_trip(r#"<partial-response><redirect url="/app/login.xhtml"/></partial-response>"#)
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert_eq!(harness.document.location().as_deref(), Some("/app/login.xhtml"));
    Ok(())
}

#[tokio::test]
async fn test_embedded_script_not_replayed_after_removal() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="host"><div id="widget"></div></div>"#);
    let update = partial(
        r#"<update id="widget"><![CDATA[<b id="ready">ready</b><script>counter++</script>]]></update>"#,
    );

    harness.round_trip(update.clone()).await?;
    assert_eq!(harness.document.executed_scripts(), vec!["counter++"]);

    harness
        .round_trip(partial(r#"<delete id="widget"/>"#))
        .await?;
    assert!(!harness.document.contains("ready"));

    // Replayed against the removed node: skipped, nothing materialized.
    let events = harness.round_trip(update).await?;
    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert!(!harness.document.contains("ready"));

    harness
        .round_trip(partial(
            r#"<update id="host"><![CDATA[<div id="widget"></div>]]></update>"#,
        ))
        .await?;

    assert!(harness.document.contains("widget"));
    assert_eq!(harness.document.inner_html("widget").as_deref(), Some(""));
    assert_eq!(harness.document.executed_scripts(), vec!["counter++"]);
    assert!(harness.errors.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_script_in_unwrapped_markup_runs_decoded() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="p"></div>"#);

    let events = harness
        .round_trip(partial(concat!(
            r#"<update id="p"><div id="inner">"#,
            "<script>if (a &amp;&amp; b &lt; c) go()</script>",
            "</div></update>"
        )))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:success"));
    assert!(harness.document.contains("inner"));
    assert_eq!(
        harness.document.executed_scripts(),
        vec!["if (a && b < c) go()"]
    );
    Ok(())
}

#[tokio::test]
async fn test_anchorless_insert_is_not_rescued_by_fallback() -> anyhow::Result<()> {
    let harness = Harness::new(r#"<div id="old">old</div>"#);
    let mutations = harness.document.mutation_count();

    let events = harness
        .round_trip(partial(concat!(
            r#"<update id="javax.faces.ViewBody"><![CDATA[<body><p id="new"></p></body>]]></update>"#,
            r#"<insert id="row9"><![CDATA[<tr id="row9"></tr>]]></insert>"#,
        )))
        .await?;

    assert_eq!(events.last().map(String::as_str), Some("trigger:malformedXML"));
    assert_eq!(harness.document.mutation_count(), mutations);
    assert!(harness.document.contains("old"));

    let errors = harness.errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].description.contains("row9"));
    Ok(())
}
