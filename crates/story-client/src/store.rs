//! The story document and the only code allowed to change it.
//!
//! Every mutation is a [`StoryAction`] folded into the latest document by the
//! pure [`reduce`] function. [`StoryStore`] runs the reducer on a single task,
//! so concurrent stages never write over each other's results.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use story_models::{
    CharacterOption, ImagePrompt, Narration, ScriptResult, SideCharacterImage, StoryDocument,
    StoryInputs, VideoPrompt,
};

use crate::error::{ClientError, ClientResult};
use crate::signature::input_signature;

/// One logical change to the story document.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryAction {
    /// Replace the document, e.g. when resuming a saved project
    Load(StoryDocument),
    SetInputs(StoryInputs),
    SetCharacterOptions(Vec<CharacterOption>),
    /// Grow or shrink the scene list, keeping existing scenes
    ResizeScenes(usize),
    /// Edit one scene's text. Its narration becomes stale.
    EditScriptText { scene_number: u32, text: String },
    /// A job result, tagged with the input signature the job was submitted
    /// under. Dropped once the inputs have changed.
    Generated { signature: String, artifact: Artifact },
}

impl StoryAction {
    /// Tag `artifact` as produced from `document`.
    pub fn generated(document: &StoryDocument, artifact: Artifact) -> Self {
        StoryAction::Generated {
            signature: input_signature(&document.inputs),
            artifact,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            StoryAction::Load(_) => "load",
            StoryAction::SetInputs(_) => "set_inputs",
            StoryAction::SetCharacterOptions(_) => "set_character_options",
            StoryAction::ResizeScenes(_) => "resize_scenes",
            StoryAction::EditScriptText { .. } => "edit_script_text",
            StoryAction::Generated { artifact, .. } => artifact.name(),
        }
    }
}

/// Generated content, with the per-scene inputs it was rendered from where
/// those can change while the job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// A fresh script replaces every scene and scene artifact
    Script(ScriptResult),
    ImagePrompts(Vec<Option<ImagePrompt>>),
    VideoPrompts(Vec<Option<VideoPrompt>>),
    /// Upsert by character name
    SideCharacterImages(Vec<Option<SideCharacterImage>>),
    SceneImages(Vec<Option<String>>),
    /// Replace one scene's image. Its video becomes stale.
    SceneImage { scene_number: u32, url: String },
    /// Clips by scene index, rendered from `source_images`
    Videos {
        urls: Vec<Option<String>>,
        source_images: Vec<Option<String>>,
    },
    SceneVideo {
        scene_number: u32,
        url: String,
        source_image: String,
    },
    /// Narrations by scene index, spoken from `source_texts`
    Narrations {
        narrations: Vec<Option<Narration>>,
        source_texts: Vec<String>,
    },
    SceneNarration {
        scene_number: u32,
        narration: Narration,
        source_text: String,
    },
    FinalVideo { url: String, sources: CutSources },
}

impl Artifact {
    fn name(&self) -> &'static str {
        match self {
            Artifact::Script(_) => "apply_script",
            Artifact::ImagePrompts(_) => "merge_image_prompts",
            Artifact::VideoPrompts(_) => "merge_video_prompts",
            Artifact::SideCharacterImages(_) => "merge_side_character_images",
            Artifact::SceneImages(_) => "merge_scene_images",
            Artifact::SceneImage { .. } => "set_scene_image",
            Artifact::Videos { .. } => "merge_videos",
            Artifact::SceneVideo { .. } => "set_scene_video",
            Artifact::Narrations { .. } => "merge_narrations",
            Artifact::SceneNarration { .. } => "set_scene_narration",
            Artifact::FinalVideo { .. } => "set_final_video",
        }
    }
}

/// The clips and narration audio a final cut is assembled from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CutSources {
    pub videos: Vec<Option<String>>,
    pub narrations: Vec<Option<String>>,
}

impl CutSources {
    pub fn of(document: &StoryDocument) -> Self {
        Self {
            videos: document.video_urls.clone(),
            narrations: document
                .narrations
                .iter()
                .map(|n| n.as_ref().map(|n| n.url.clone()))
                .collect(),
        }
    }
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub document: StoryDocument,
    /// Downstream artifacts were cleared because the inputs changed
    pub invalidated: bool,
    /// Some or all of a job result was dropped as out of date
    pub stale: bool,
}

/// Compare the inputs against the recorded signature.
///
/// No recorded signature means the artifacts are adopted as-is. A different
/// one clears every downstream artifact. Returns whether anything was cleared.
fn reconcile_signature(document: &mut StoryDocument) -> bool {
    let signature = input_signature(&document.inputs);
    let invalidated = match &document.input_signature {
        None => false,
        Some(recorded) if *recorded == signature => false,
        Some(_) => {
            document.clear_downstream();
            true
        }
    };
    document.input_signature = Some(signature);
    invalidated
}

/// Write each present, usable entry into the slot with the same index.
///
/// Missing entries, unusable entries and indices past the end are ignored.
/// Returns the indices whose value changed.
fn merge_slots<T: PartialEq>(
    slots: &mut [Option<T>],
    incoming: Vec<Option<T>>,
    usable: impl Fn(&T) -> bool,
) -> Vec<usize> {
    let mut changed = Vec::new();
    for (index, entry) in incoming.into_iter().enumerate() {
        let Some(value) = entry.filter(|v| usable(v)) else {
            continue;
        };
        let Some(slot) = slots.get_mut(index) else {
            continue;
        };
        if slot.as_ref() != Some(&value) {
            *slot = Some(value);
            changed.push(index);
        }
    }
    changed
}

/// Blank every entry whose source no longer matches. Returns whether any
/// present entry was blanked.
fn drop_superseded<T>(entries: &mut [Option<T>], current: impl Fn(usize) -> bool) -> bool {
    let mut dropped = false;
    for (index, entry) in entries.iter_mut().enumerate() {
        if entry.is_some() && !current(index) {
            *entry = None;
            dropped = true;
        }
    }
    dropped
}

/// Apply a job result. Returns whether any of it was out of date.
fn apply_artifact(document: &mut StoryDocument, artifact: &Artifact) -> bool {
    match artifact {
        Artifact::Script(script) => {
            document.clear_downstream();
            document.title = script.title.clone();
            document.scenes = script.scenes.clone();
            for (index, scene) in document.scenes.iter_mut().enumerate() {
                scene.scene_number = index as u32 + 1;
            }
            document.blueprint = Some(script.blueprint.clone());
            document.align_to_scenes();
        }
        Artifact::ImagePrompts(prompts) => {
            merge_slots(&mut document.image_prompts, prompts.clone(), |p| {
                !p.prompt.is_empty()
            });
        }
        Artifact::VideoPrompts(prompts) => {
            merge_slots(&mut document.video_prompts, prompts.clone(), |p| {
                !p.prompt.is_empty()
            });
        }
        Artifact::SideCharacterImages(images) => {
            for image in images.iter().flatten().filter(|i| !i.image_url.is_empty()) {
                match document
                    .side_character_images
                    .iter_mut()
                    .find(|existing| existing.name == image.name)
                {
                    Some(existing) => *existing = image.clone(),
                    None => document.side_character_images.push(image.clone()),
                }
            }
        }
        Artifact::SceneImages(urls) => {
            let changed = merge_slots(&mut document.image_urls, urls.clone(), |u| !u.is_empty());
            for index in changed {
                document.video_urls[index] = None;
            }
        }
        Artifact::SceneImage { scene_number, url } => {
            if let Some(index) = document.scene_index(*scene_number) {
                document.image_urls[index] = Some(url.clone());
                document.video_urls[index] = None;
            }
        }
        Artifact::Videos {
            urls,
            source_images,
        } => {
            let mut urls = urls.clone();
            let stale = drop_superseded(&mut urls, |index| {
                source_images.get(index) == document.image_urls.get(index)
            });
            merge_slots(&mut document.video_urls, urls, |u| !u.is_empty());
            return stale;
        }
        Artifact::SceneVideo {
            scene_number,
            url,
            source_image,
        } => {
            if let Some(index) = document.scene_index(*scene_number) {
                if document.image_urls[index].as_ref() != Some(source_image) {
                    return true;
                }
                document.video_urls[index] = Some(url.clone());
            }
        }
        Artifact::Narrations {
            narrations,
            source_texts,
        } => {
            let mut narrations = narrations.clone();
            let stale = drop_superseded(&mut narrations, |index| {
                source_texts.get(index) == document.scenes.get(index).map(|s| &s.script_text)
            });
            merge_slots(&mut document.narrations, narrations, |n| !n.url.is_empty());
            return stale;
        }
        Artifact::SceneNarration {
            scene_number,
            narration,
            source_text,
        } => {
            if let Some(index) = document.scene_index(*scene_number) {
                if document.scenes[index].script_text != *source_text {
                    return true;
                }
                document.narrations[index] = Some(narration.clone());
            }
        }
        Artifact::FinalVideo { url, sources } => {
            if CutSources::of(document) != *sources {
                return true;
            }
            document.final_video_url = Some(url.clone());
        }
    }
    false
}

/// Apply one action to a document.
///
/// A final cut no longer matches once any scene's clip or narration changes,
/// so it is cleared along with them.
pub fn reduce(mut document: StoryDocument, action: &StoryAction) -> Reduced {
    document.align_to_scenes();
    let cut = CutSources::of(&document);
    let mut invalidated = false;
    let mut stale = false;

    match action {
        StoryAction::Load(loaded) => {
            document = loaded.clone();
            document.align_to_scenes();
            invalidated = reconcile_signature(&mut document);
        }
        StoryAction::SetInputs(inputs) => {
            document.inputs = inputs.clone();
            invalidated = reconcile_signature(&mut document);
        }
        StoryAction::SetCharacterOptions(options) => {
            document.character_options = options.clone();
        }
        StoryAction::ResizeScenes(count) => {
            document.resize_scenes(*count);
        }
        StoryAction::EditScriptText { scene_number, text } => {
            if let Some(index) = document.scene_index(*scene_number) {
                if document.scenes[index].script_text != *text {
                    document.scenes[index].script_text = text.clone();
                    document.narrations[index] = None;
                }
            }
        }
        StoryAction::Generated {
            signature,
            artifact,
        } => {
            if *signature != input_signature(&document.inputs) {
                stale = true;
            } else {
                stale = apply_artifact(&mut document, artifact);
            }
        }
    }

    if !matches!(action, StoryAction::Load(_)) && CutSources::of(&document) != cut {
        document.final_video_url = None;
    }

    Reduced {
        document,
        invalidated,
        stale,
    }
}

/// Published view of the store.
#[derive(Debug, Clone, Default)]
pub struct StoryState {
    pub document: StoryDocument,
    /// Bumped on every action that changed the document
    pub revision: u64,
    /// Number of times downstream artifacts were cleared
    pub invalidations: u64,
}

enum Command {
    Apply {
        action: StoryAction,
        applied: Option<oneshot::Sender<bool>>,
    },
    /// Answered once everything queued before it is applied
    Barrier(oneshot::Sender<()>),
}

/// Handle to the single-writer story document.
///
/// Clones share the same document. The writer task stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct StoryStore {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<StoryState>,
}

impl StoryStore {
    /// Start the writer task with `document` loaded.
    pub fn spawn(document: StoryDocument) -> Self {
        let initial = reduce(StoryDocument::default(), &StoryAction::Load(document));
        let (state_tx, state) = watch::channel(StoryState {
            document: initial.document,
            revision: 0,
            invalidations: u64::from(initial.invalidated),
        });
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(rx, state_tx));
        Self { commands, state }
    }

    /// Apply an action and wait until it is visible. Returns whether it
    /// cleared downstream artifacts.
    pub async fn dispatch(&self, action: StoryAction) -> ClientResult<bool> {
        let (applied, done) = oneshot::channel();
        self.commands
            .send(Command::Apply {
                action,
                applied: Some(applied),
            })
            .map_err(|_| ClientError::StoreClosed)?;
        done.await.map_err(|_| ClientError::StoreClosed)
    }

    /// Queue an action without waiting. Actions from one caller apply in order.
    pub fn send(&self, action: StoryAction) -> ClientResult<()> {
        self.commands
            .send(Command::Apply {
                action,
                applied: None,
            })
            .map_err(|_| ClientError::StoreClosed)
    }

    /// Wait until every action queued so far is applied.
    pub async fn settled(&self) -> ClientResult<()> {
        let (reached, done) = oneshot::channel();
        self.commands
            .send(Command::Barrier(reached))
            .map_err(|_| ClientError::StoreClosed)?;
        done.await.map_err(|_| ClientError::StoreClosed)
    }

    pub fn snapshot(&self) -> StoryDocument {
        self.state.borrow().document.clone()
    }

    pub fn state(&self) -> StoryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoryState> {
        self.state.clone()
    }
}

async fn run_writer(
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<StoryState>,
) {
    while let Some(command) = commands.recv().await {
        let (action, applied) = match command {
            Command::Apply { action, applied } => (action, applied),
            Command::Barrier(reached) => {
                let _ = reached.send(());
                continue;
            }
        };
        let current = state.borrow().document.clone();
        let reduced = reduce(current.clone(), &action);
        let changed = reduced.document != current;
        if reduced.invalidated {
            info!(action = action.name(), "Inputs changed, cleared generated artifacts");
        }
        if reduced.stale {
            info!(action = action.name(), "Dropped out-of-date job result");
        }
        debug!(action = action.name(), changed, "Applied story action");

        if changed || reduced.invalidated {
            state.send_modify(|s| {
                s.document = reduced.document;
                s.revision += 1;
                s.invalidations += u64::from(reduced.invalidated);
            });
        }
        if let Some(applied) = applied {
            let _ = applied.send(reduced.invalidated);
        }
    }
    debug!("Story store closed");
}
