use story_models::{validate_script_text, ScriptRequest, ScriptResult};
use story_queue::JobReporter;

use super::TaskContext;
use crate::error::{WorkerError, WorkerResult};

/// Check a generated script against the requested scene count and the
/// per-scene length rule. Scene numbers are reassigned by position.
pub fn check_script(mut script: ScriptResult, scene_count: u32) -> WorkerResult<ScriptResult> {
    if script.scenes.len() != scene_count as usize {
        return Err(WorkerError::invalid_output(format!(
            "expected {} scenes, got {}",
            scene_count,
            script.scenes.len()
        )));
    }
    for (index, scene) in script.scenes.iter_mut().enumerate() {
        scene.scene_number = index as u32 + 1;
        validate_script_text(&scene.script_text).map_err(|e| {
            WorkerError::invalid_output(format!("scene {}: {}", scene.scene_number, e))
        })?;
    }
    if script.title.trim().is_empty() {
        script.title = "Untitled Story".to_string();
    }
    Ok(script)
}

pub(super) async fn generate_script(
    ctx: &TaskContext<'_>,
    reporter: &mut JobReporter,
    request: &ScriptRequest,
) -> WorkerResult<ScriptResult> {
    let attempts = ctx.config.script_attempts.max(1);
    reporter
        .progress(0, attempts, "Writing the story script...", None)
        .await?;

    let mut last_error = None;
    for attempt in 1..=attempts {
        let outcome = match ctx.backend.generate_script(request).await {
            Ok(script) => check_script(script, request.scene_count),
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(script) => return Ok(script),
            Err(e) if !e.is_retryable() && !matches!(e, WorkerError::InvalidOutput(_)) => {
                return Err(e)
            }
            Err(e) => {
                ctx.logger
                    .log_warning(&format!("Script attempt {}/{} rejected: {}", attempt, attempts, e));
                if attempt < attempts {
                    reporter
                        .progress(
                            attempt,
                            attempts,
                            format!("Rewriting the script ({}/{})...", attempt + 1, attempts),
                            None,
                        )
                        .await?;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| WorkerError::job_failed("script generation produced nothing")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_models::{ScriptScene, VisualBlueprint};

    fn script(lines: &[&str]) -> ScriptResult {
        ScriptResult {
            title: String::new(),
            scenes: lines
                .iter()
                .map(|text| ScriptScene {
                    scene_number: 99,
                    script_text: text.to_string(),
                    ..Default::default()
                })
                .collect(),
            blueprint: VisualBlueprint::default(),
        }
    }

    #[test]
    fn test_check_script_renumbers_and_titles() {
        let checked = check_script(script(&["하나", "둘"]), 2).unwrap();
        assert_eq!(checked.title, "Untitled Story");
        assert_eq!(checked.scenes[1].scene_number, 2);
    }

    #[test]
    fn test_check_script_rejects_wrong_count_and_long_lines() {
        assert!(check_script(script(&["하나"]), 2).is_err());

        let long = "가".repeat(31);
        let err = check_script(script(&["하나", &long]), 2).unwrap_err();
        assert!(err.to_string().contains("scene 2"));
    }
}
