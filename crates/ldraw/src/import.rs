//! Loading whole models: single `.ldr` files and multi-part `.mpd`
//! documents whose `0 FILE` blocks define sub-models.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::command::{Command, CommandKind};
use crate::diagnostics::Diagnostics;
use crate::parser::parse_kind;
use crate::part::{LineReader, PartDefinition, PartKind, part_key};
use crate::store::PartStore;
use crate::{LDrawError, Result};

/// Progress and cancellation hooks for an import.
#[derive(Default)]
pub struct ImportOptions<'a> {
    progress: Option<Box<dyn FnMut(f64) + 'a>>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> ImportOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per line with the fraction done, `0.0..=1.0`.
    pub fn on_progress(mut self, f: impl FnMut(f64) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Import stops with [`LDrawError::Cancelled`] once `flag` is set.
    pub fn cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(LDrawError::Cancelled);
        }
        Ok(())
    }

    fn tick(&mut self, done: usize, total: usize) -> Result<()> {
        self.check_cancel()?;
        if let Some(progress) = self.progress.as_mut() {
            progress(done as f64 / total.max(1) as f64);
        }
        Ok(())
    }
}

/// Result of an import. Every part listed here is registered as a custom
/// part of the store.
#[derive(Debug)]
pub struct ImportedModel {
    pub main: Arc<PartDefinition>,
    pub submodels: Vec<Arc<PartDefinition>>,
    pub diagnostics: Diagnostics,
}

/// Imports `path`, choosing the MPD reader when the file has `0 FILE`
/// blocks. References the store cannot resolve are looked up in the
/// model's folder and loaded as sub-models.
pub fn import_file(
    path: &Path,
    store: &mut PartStore,
    options: &mut ImportOptions<'_>,
) -> Result<ImportedModel> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let folder = path.parent().map(ModelFolder::new);
    run(&name, &text, store, options, folder, |ctx, name, text| {
        if text.lines().any(is_file_line) {
            ctx.mpd(name, text)
        } else {
            ctx.ldr(name, text)
        }
    })
}

pub fn import(
    name: &str,
    text: &str,
    store: &mut PartStore,
    options: &mut ImportOptions<'_>,
) -> Result<ImportedModel> {
    if text.lines().any(is_file_line) {
        import_mpd(name, text, store, options)
    } else {
        import_ldr(name, text, store, options)
    }
}

fn is_file_line(line: &str) -> bool {
    let mut t = line.split_whitespace();
    t.next() == Some("0") && t.next().is_some_and(|k| k.eq_ignore_ascii_case("FILE"))
}

/// A single-file model. Referenced parts come from the store's library.
pub fn import_ldr(
    name: &str,
    text: &str,
    store: &mut PartStore,
    options: &mut ImportOptions<'_>,
) -> Result<ImportedModel> {
    run(name, text, store, options, None, |ctx, name, text| ctx.ldr(name, text))
}

/// A multi-part document. The first `0 FILE` block is the main model.
pub fn import_mpd(
    name: &str,
    text: &str,
    store: &mut PartStore,
    options: &mut ImportOptions<'_>,
) -> Result<ImportedModel> {
    run(name, text, store, options, None, |ctx, name, text| ctx.mpd(name, text))
}

/// Runs one import. On failure every custom registration it made is
/// undone, restoring definitions it had replaced.
fn run(
    name: &str,
    text: &str,
    store: &mut PartStore,
    options: &mut ImportOptions<'_>,
    folder: Option<ModelFolder>,
    read: impl FnOnce(&mut Context<'_, '_, '_>, &str, &str) -> Result<ImportedModel>,
) -> Result<ImportedModel> {
    let mut ctx = Context {
        store,
        options,
        folder,
        registered: Vec::new(),
    };
    match read(&mut ctx, name, text) {
        Ok(mut model) => {
            if let Some(folder) = ctx.folder.take() {
                model.submodels.extend(folder.loaded);
            }
            info!(
                "Imported {name}: main model {}, {} sub-models",
                model.main.id(),
                model.submodels.len()
            );
            Ok(model)
        }
        Err(e) => {
            ctx.roll_back();
            Err(e)
        }
    }
}

/// Folder of a model read from disk, searched for sub-files.
struct ModelFolder {
    dir: PathBuf,
    loaded: Vec<Arc<PartDefinition>>,
}

impl ModelFolder {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            loaded: Vec::new(),
        }
    }

    fn locate(&self, id: &str) -> Option<PathBuf> {
        let written = id.trim().replace('\\', "/");
        [written, part_key(id)]
            .into_iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.is_file())
    }
}

struct Block {
    name: String,
    /// 0-based index of the `0 FILE` line.
    start: usize,
    end: usize,
}

struct Context<'s, 'o, 'a> {
    store: &'s mut PartStore,
    options: &'o mut ImportOptions<'a>,
    folder: Option<ModelFolder>,
    /// Ids registered so far with the custom part each one replaced.
    registered: Vec<(String, Option<Arc<PartDefinition>>)>,
}

impl Context<'_, '_, '_> {
    fn register(&mut self, part: PartDefinition) -> Result<Arc<PartDefinition>> {
        let key = part.key();
        if !self.registered.iter().any(|(k, _)| *k == key) {
            let previous = self.store.custom_part(&key);
            self.registered.push((key, previous));
        }
        self.store.register_custom(part)
    }

    fn roll_back(&mut self) {
        for (key, previous) in self.registered.drain(..).rev() {
            self.store.restore_custom(&key, previous);
        }
    }

    fn ldr(&mut self, name: &str, text: &str) -> Result<ImportedModel> {
        let lines: Vec<&str> = text.lines().collect();
        let mut diags = Diagnostics::new();
        // placeholder so sub-files referring back to the model resolve
        self.register(PartDefinition::new(name, PartKind::Model))?;
        let mut part = PartDefinition::new(name, PartKind::Model);
        let numbered = lines.iter().enumerate().map(|(i, l)| (i + 1, *l));
        self.fill(&mut part, numbered, Some(lines.len()), &mut diags)?;
        part.kind = PartKind::Model;
        let main = self.register(part)?;
        Ok(ImportedModel {
            main,
            submodels: Vec::new(),
            diagnostics: diags,
        })
    }

    fn mpd(&mut self, name: &str, text: &str) -> Result<ImportedModel> {
        let lines: Vec<&str> = text.lines().collect();
        let mut diags = Diagnostics::new();

        // first pass: find and register every block so forward references resolve
        let mut blocks: Vec<Block> = Vec::new();
        let mut open = false;
        for (i, line) in lines.iter().enumerate() {
            self.options.check_cancel()?;
            match parse_kind(line, i + 1, false) {
                Ok(CommandKind::File(file)) => {
                    if let Some(last) = blocks.last_mut().filter(|_| open) {
                        last.end = i;
                    }
                    blocks.push(Block {
                        name: file,
                        start: i,
                        end: lines.len(),
                    });
                    open = true;
                }
                Ok(CommandKind::NoFile) => {
                    match blocks.last_mut().filter(|_| open) {
                        Some(last) => last.end = i,
                        None => diags.warning(name, i + 1, "NOFILE outside a FILE block"),
                    }
                    open = false;
                }
                Ok(CommandKind::Empty) => {}
                _ if !open => diags.warning(name, i + 1, "Line outside a FILE block ignored"),
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for block in blocks {
            let key = part_key(&block.name);
            if self.store.is_internal(&key) {
                diags.warning(
                    name,
                    block.start + 1,
                    format!("Sub-model {} clashes with an internal part, skipped", block.name),
                );
                continue;
            }
            if !seen.insert(key) {
                diags.warning(
                    name,
                    block.start + 1,
                    format!("Duplicate sub-model {}, skipped", block.name),
                );
                continue;
            }
            let kind = if accepted.is_empty() {
                PartKind::Model
            } else {
                PartKind::Submodel
            };
            self.register(PartDefinition::new(&block.name, kind))?;
            accepted.push((block, kind));
        }
        if accepted.is_empty() {
            return Err(LDrawError::State(format!("{name} has no usable FILE block")));
        }
        debug!("{name}: {} sub-models", accepted.len());

        // second pass: fill the parts
        let mut parts = Vec::with_capacity(accepted.len());
        for (block, kind) in accepted {
            let mut part = PartDefinition::new(&block.name, kind);
            let numbered = (block.start + 1..block.end).map(|i| (i + 1, lines[i]));
            self.fill(&mut part, numbered, Some(lines.len()), &mut diags)?;
            part.kind = kind;
            parts.push(self.register(part)?);
        }

        let mut parts = parts.into_iter();
        let Some(main) = parts.next() else {
            return Err(LDrawError::State(format!("{name} has no usable FILE block")));
        };
        Ok(ImportedModel {
            main,
            submodels: parts.collect(),
            diagnostics: diags,
        })
    }

    /// True when `id` can be placed, loading it from the model folder if
    /// the store does not know it.
    fn resolve(&mut self, id: &str, diags: &mut Diagnostics) -> Result<bool> {
        if self.store.exists(id) {
            return Ok(true);
        }
        let Some(path) = self.folder.as_ref().and_then(|f| f.locate(id)) else {
            return Ok(false);
        };
        let text = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                diags.warning(id, 0, format!("Unable to read {}: {e}", path.display()));
                return Ok(false);
            }
        };
        // placeholder first so references back to this file resolve
        self.register(PartDefinition::new(id, PartKind::Submodel))?;
        let mut part = PartDefinition::new(id, PartKind::Submodel);
        let numbered = text.lines().enumerate().map(|(i, l)| (i + 1, l));
        self.fill(&mut part, numbered, None, diags)?;
        part.kind = PartKind::Submodel;
        let part = self.register(part)?;
        debug!("Loaded sub-file {} from {}", part.id(), path.display());
        if let Some(folder) = self.folder.as_mut() {
            folder.loaded.push(part);
        }
        Ok(true)
    }

    /// Reads numbered lines into `part`. References that cannot be resolved
    /// are reported and dropped. Progress is reported against `total` lines
    /// when given.
    fn fill<'l>(
        &mut self,
        part: &mut PartDefinition,
        lines: impl Iterator<Item = (usize, &'l str)>,
        total: Option<usize>,
        diags: &mut Diagnostics,
    ) -> Result<()> {
        let file = part.id().to_string();
        let mut reader = LineReader::default();
        for (line_no, line) in lines {
            match total {
                Some(total) => self.options.tick(line_no, total)?,
                None => self.options.check_cancel()?,
            }
            let kind = match reader.read(line, line_no) {
                Ok(kind) => kind,
                Err(e) => {
                    diags.error(&file, line_no, e.to_string());
                    continue;
                }
            };
            match reader.absorb(part, kind) {
                None => {}
                Some(CommandKind::Step) => {
                    part.advance_step();
                }
                Some(CommandKind::File(_)) | Some(CommandKind::NoFile) => {
                    diags.warning(&file, line_no, "Unexpected FILE/NOFILE command");
                }
                Some(CommandKind::Unknown(reason)) => diags.warning(&file, line_no, reason),
                Some(CommandKind::Reference(r)) => {
                    if self.resolve(&r.part_id, diags)? {
                        let command = Command::new(self.store.ids(), CommandKind::Reference(r));
                        part.add_or_replace(command);
                    } else {
                        let e = LDrawError::UnresolvedReference(r.part_id);
                        diags.warning(&file, line_no, e.to_string());
                    }
                }
                Some(kind) => {
                    part.add_or_replace(Command::new(self.store.ids(), kind));
                }
            }
        }
        Ok(())
    }
}
