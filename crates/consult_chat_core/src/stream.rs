//! crates/consult_chat_core/src/stream.rs
//!
//! Drains an inference fragment stream into the final response text.

use futures::{future, Stream, TryStreamExt};

use crate::ports::PortResult;

/// Yields the non-empty fragments of `stream` in arrival order.
///
/// Fragments without content, or with empty content, are dropped. An error item
/// is passed through and ends consumption for callers using `?`.
pub fn text_fragments<S>(stream: S) -> impl Stream<Item = PortResult<String>> + Send
where
    S: Stream<Item = PortResult<Option<String>>> + Send,
{
    stream.try_filter_map(|fragment| {
        future::ready(Ok(fragment.filter(|text: &String| !text.is_empty())))
    })
}

/// Consumes the whole stream, calling `on_fragment` for every non-empty fragment,
/// and returns their concatenation.
pub async fn collect_response<S, F>(stream: S, mut on_fragment: F) -> PortResult<String>
where
    S: Stream<Item = PortResult<Option<String>>> + Send,
    F: FnMut(&str) + Send,
{
    let fragments = text_fragments(stream);
    futures::pin_mut!(fragments);

    let mut response = String::new();
    while let Some(fragment) = fragments.try_next().await? {
        on_fragment(&fragment);
        response.push_str(&fragment);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use futures::stream;

    fn fragments(parts: Vec<Option<&str>>) -> impl Stream<Item = PortResult<Option<String>>> + Send {
        stream::iter(
            parts
                .into_iter()
                .map(|part| Ok(part.map(str::to_string)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn concatenates_and_skips_empty_fragments() {
        let mut emitted = Vec::new();
        let response = collect_response(
            fragments(vec![Some("Hel"), Some(""), Some("lo")]),
            |fragment| emitted.push(fragment.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(response, "Hello");
        assert_eq!(emitted, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn skips_fragments_without_content() {
        let response = collect_response(fragments(vec![None, Some("ok"), None]), |_| {})
            .await
            .unwrap();
        assert_eq!(response, "ok");
    }

    #[tokio::test]
    async fn stream_error_aborts_collection() {
        let items: Vec<PortResult<Option<String>>> = vec![
            Ok(Some("partial".to_string())),
            Err(PortError::Unexpected("connection reset".to_string())),
            Ok(Some("never".to_string())),
        ];
        let mut seen = 0;
        let result = collect_response(stream::iter(items), |_| seen += 1).await;

        assert!(matches!(result, Err(PortError::Unexpected(_))));
        assert_eq!(seen, 1);
    }
}
