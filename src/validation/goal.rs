//! Goal-text extraction.
//!
//! Produces the single prediction string the LLM stages operate on. The
//! pre-computed `prediction_context` wins when present; otherwise the
//! goal slices are concatenated in order, pulling text from each slice's
//! own post when it names one and from the leased post otherwise.

use std::collections::HashMap;

use crate::error::StorageResult;
use crate::storage::{LeasedTuple, PostSource};

/// Extract the prediction text for a leased tuple.
///
/// Returns `None` when nothing could be extracted, which the pipeline
/// maps to an `Invalid` outcome. Post lookups are cached for the duration
/// of the call.
pub async fn extract(
    tuple: &LeasedTuple,
    posts: &dyn PostSource,
) -> StorageResult<Option<String>> {
    if let Some(context) = &tuple.details.prediction_context {
        if !context.is_empty() {
            return Ok(Some(context.clone()));
        }
    }

    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    let mut extracted = String::new();

    for slice in &tuple.prediction.goal_slices {
        let text = match &slice.source_post_id {
            Some(post_id) if post_id != &tuple.post.id => {
                if !cache.contains_key(post_id) {
                    let fetched = posts.post_text(post_id).await?;
                    cache.insert(post_id.clone(), fetched);
                }
                match cache.get(post_id).and_then(|t| t.as_deref()) {
                    Some(text) => text.to_string(),
                    // Referenced post is gone; fall back to the leased post.
                    None => tuple.post.text.clone(),
                }
            }
            _ => tuple.post.text.clone(),
        };

        extracted.push_str(&slice_chars(&text, slice.start, slice.end));
    }

    if extracted.is_empty() {
        return Ok(None);
    }

    Ok(Some(extracted))
}

/// Slice by Unicode code points with clamping half-open bounds.
///
/// Upstream offsets are code-point positions; walking chars keeps the cut
/// on UTF-8 boundaries. Inverted or out-of-range slices yield the empty
/// string instead of erroring.
fn slice_chars(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GoalSlice, Post, Prediction, PredictionDetails, StaticPosts};

    fn tuple_with(
        context: Option<&str>,
        slices: Vec<GoalSlice>,
        post_text: &str,
    ) -> LeasedTuple {
        LeasedTuple {
            prediction: Prediction {
                id: "pred-1".to_string(),
                source_post_id: "post-1".to_string(),
                goal_slices: slices,
                llm_confidence: None,
                prediction_quality: None,
                vagueness: None,
            },
            details: PredictionDetails {
                prediction_id: "pred-1".to_string(),
                prediction_context: context.map(|s| s.to_string()),
                timeframe_start: None,
                timeframe_end: None,
                timeframe_status: Some("explicit".to_string()),
                filter_validation_confidence: None,
                filter_validation_reasoning: None,
            },
            post: Post {
                id: "post-1".to_string(),
                text: post_text.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_context_wins_over_slices() {
        let tuple = tuple_with(
            Some("Bitcoin closes above 100000 in 2025"),
            vec![GoalSlice {
                start: 0,
                end: 5,
                source_post_id: None,
            }],
            "unrelated post text",
        );
        let posts = StaticPosts::default();

        let text = extract(&tuple, &posts).await.unwrap();
        assert_eq!(text.as_deref(), Some("Bitcoin closes above 100000 in 2025"));
    }

    #[tokio::test]
    async fn test_empty_context_falls_back_to_slices() {
        let tuple = tuple_with(
            Some(""),
            vec![GoalSlice {
                start: 0,
                end: 5,
                source_post_id: None,
            }],
            "hello world",
        );
        let posts = StaticPosts::default();

        let text = extract(&tuple, &posts).await.unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_slices_concatenate_in_order() {
        let tuple = tuple_with(
            None,
            vec![
                GoalSlice {
                    start: 6,
                    end: 11,
                    source_post_id: None,
                },
                GoalSlice {
                    start: 0,
                    end: 6,
                    source_post_id: None,
                },
            ],
            "hello world",
        );
        let posts = StaticPosts::default();

        let text = extract(&tuple, &posts).await.unwrap();
        assert_eq!(text.as_deref(), Some("worldhello "));
    }

    #[tokio::test]
    async fn test_cross_post_slice_fetched_on_demand() {
        let tuple = tuple_with(
            None,
            vec![
                GoalSlice {
                    start: 0,
                    end: 4,
                    source_post_id: None,
                },
                GoalSlice {
                    start: 0,
                    end: 6,
                    source_post_id: Some("post-2".to_string()),
                },
            ],
            "main post",
        );
        let posts = StaticPosts::new([("post-2".to_string(), "quoted text".to_string())]);

        let text = extract(&tuple, &posts).await.unwrap();
        assert_eq!(text.as_deref(), Some("mainquoted"));
    }

    #[tokio::test]
    async fn test_missing_referenced_post_falls_back_to_leased_post() {
        let tuple = tuple_with(
            None,
            vec![GoalSlice {
                start: 0,
                end: 4,
                source_post_id: Some("post-gone".to_string()),
            }],
            "main post",
        );
        let posts = StaticPosts::default();

        let text = extract(&tuple, &posts).await.unwrap();
        assert_eq!(text.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_empty_extraction_is_none() {
        let tuple = tuple_with(None, vec![], "whatever");
        let posts = StaticPosts::default();
        assert_eq!(extract(&tuple, &posts).await.unwrap(), None);

        let tuple = tuple_with(
            None,
            vec![GoalSlice {
                start: 10,
                end: 5,
                source_post_id: None,
            }],
            "short",
        );
        assert_eq!(extract(&tuple, &posts).await.unwrap(), None);
    }

    #[test]
    fn test_slice_chars_half_open() {
        assert_eq!(slice_chars("hello world", 0, 5), "hello");
        assert_eq!(slice_chars("hello world", 6, 11), "world");
    }

    #[test]
    fn test_slice_chars_clamps_out_of_range() {
        assert_eq!(slice_chars("short", 0, 100), "short");
        assert_eq!(slice_chars("short", 10, 20), "");
        assert_eq!(slice_chars("short", 3, 2), "");
    }

    #[test]
    fn test_slice_chars_counts_code_points() {
        // Multi-byte characters count as one position each.
        assert_eq!(slice_chars("héllo wörld", 0, 5), "héllo");
        assert_eq!(slice_chars("日本語のテキスト", 0, 3), "日本語");
    }
}
