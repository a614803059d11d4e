use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use log::{debug, trace};

use crate::command::{Command, CommandKind, PartReference};
use crate::diagnostics::Diagnostics;
use crate::ids::{CommandId, IdAllocator};
use crate::parser::parse_kind;
use crate::step::StepSequencer;

/// Classification from the `!LDRAW_ORG` header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Official,
    Subpart,
    Primitive,
    Primitive48,
    Primitive8,
    Unofficial,
    Unofficial48,
    Unofficial8,
    UnofficialSubpart,
    UnofficialPrimitive,
    /// Generated geometry with no file behind it.
    GeomPrimitive,
    /// Rendering command pseudo-part (`STEP`, `!COLOUR`, ...).
    Command,
    Model,
    Submodel,
    Shortcut,
    UnofficialShortcut,
    None,
}

impl PartKind {
    pub fn is_official(self) -> bool {
        matches!(
            self,
            PartKind::Official
                | PartKind::Subpart
                | PartKind::Primitive
                | PartKind::Primitive48
                | PartKind::Primitive8
                | PartKind::Shortcut
        )
    }

    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            PartKind::Primitive
                | PartKind::Primitive48
                | PartKind::Primitive8
                | PartKind::UnofficialPrimitive
                | PartKind::Unofficial48
                | PartKind::Unofficial8
                | PartKind::GeomPrimitive
        )
    }

    pub fn is_subpart(self) -> bool {
        matches!(self, PartKind::Subpart | PartKind::UnofficialSubpart)
    }

    pub fn is_model(self) -> bool {
        matches!(self, PartKind::Model | PartKind::Submodel)
    }

    /// The same kind on the other side of the official/unofficial axis.
    pub fn unofficial(self) -> PartKind {
        match self {
            PartKind::Official => PartKind::Unofficial,
            PartKind::Subpart => PartKind::UnofficialSubpart,
            PartKind::Primitive => PartKind::UnofficialPrimitive,
            PartKind::Primitive48 => PartKind::Unofficial48,
            PartKind::Primitive8 => PartKind::Unofficial8,
            PartKind::Shortcut => PartKind::UnofficialShortcut,
            other => other,
        }
    }

    /// Text used on a `0 !LDRAW_ORG` line.
    pub fn as_str(self) -> &'static str {
        match self {
            PartKind::Official => "Part",
            PartKind::Subpart => "Subpart",
            PartKind::Primitive => "Primitive",
            PartKind::Primitive48 => "48_Primitive",
            PartKind::Primitive8 => "8_Primitive",
            PartKind::Unofficial => "Unofficial_Part",
            PartKind::Unofficial48 => "Unofficial_48_Primitive",
            PartKind::Unofficial8 => "Unofficial_8_Primitive",
            PartKind::UnofficialSubpart => "Unofficial_Subpart",
            PartKind::UnofficialPrimitive => "Unofficial_Primitive",
            PartKind::GeomPrimitive => "",
            PartKind::Command => "",
            PartKind::Model => "Model",
            PartKind::Submodel => "Submodel",
            PartKind::Shortcut => "Shortcut",
            PartKind::UnofficialShortcut => "Unofficial_Shortcut",
            PartKind::None => "",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            "" => write!(f, "{self:?}"),
            s => f.write_str(s),
        }
    }
}

/// Case-insensitive lookup key for part ids; folder separators become `/`.
pub fn part_key(id: &str) -> String {
    id.trim().to_lowercase().replace('\\', "/")
}

/// One LDraw file: header metadata plus an ordered command list grouped into
/// build steps.
#[derive(Debug, Clone)]
pub struct PartDefinition {
    id: String,
    pub kind: PartKind,
    pub description: String,
    pub author: String,
    pub name: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub license: String,
    pub last_update: Option<NaiveDate>,
    commands: Vec<Command>,
    index: HashMap<CommandId, usize>,
    steps: StepSequencer,
}

impl PartDefinition {
    /// Empty part, e.g. for a model built interactively.
    pub fn new(id: &str, kind: PartKind) -> Self {
        Self {
            id: id.trim().to_string(),
            kind,
            description: String::new(),
            author: String::new(),
            name: String::new(),
            category: String::new(),
            keywords: Vec::new(),
            license: String::new(),
            last_update: None,
            commands: Vec::new(),
            index: HashMap::new(),
            steps: StepSequencer::new(),
        }
    }

    /// Parses a whole file. Bad lines are reported in the returned
    /// diagnostics and skipped.
    pub fn parse(id: &str, text: &str, ids: &IdAllocator) -> (Self, Diagnostics) {
        let mut part = PartDefinition::new(id, PartKind::Unofficial);
        let mut diags = Diagnostics::new();
        let mut reader = LineReader::default();

        for (n, line) in text.lines().enumerate() {
            let line_no = n + 1;
            let kind = match reader.read(line, line_no) {
                Ok(kind) => kind,
                Err(e) => {
                    diags.error(id, line_no, e.to_string());
                    continue;
                }
            };
            match reader.absorb(&mut part, kind) {
                None => {}
                Some(CommandKind::Step) => {
                    part.advance_step();
                }
                Some(CommandKind::File(_)) | Some(CommandKind::NoFile) => {
                    diags.warning(id, line_no, "Illegal FILE/NOFILE command in a single file");
                }
                Some(CommandKind::Unknown(reason)) => diags.warning(id, line_no, reason),
                Some(kind) => {
                    part.add_or_replace(Command::new(ids, kind));
                }
            }
        }
        debug!(
            "Parsed {id}: {} commands, {} steps",
            part.commands.len(),
            part.steps.count()
        );
        (part, diags)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> String {
        part_key(&self.id)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn command(&self, id: CommandId) -> Option<&Command> {
        self.index.get(&id).map(|&i| &self.commands[i])
    }

    pub fn references(&self) -> impl Iterator<Item = (&Command, &PartReference)> {
        self.commands
            .iter()
            .filter_map(|c| c.reference().map(|r| (c, r)))
    }

    /// Replaces the command with the same id in place, or appends a new one
    /// to the list and the current step. Returns the replaced command.
    pub fn add_or_replace(&mut self, command: Command) -> Option<Command> {
        let id = command.id();
        match self.index.get(&id) {
            Some(&pos) => Some(std::mem::replace(&mut self.commands[pos], command)),
            None => {
                self.index.insert(id, self.commands.len());
                self.commands.push(command);
                self.steps.add(id);
                None
            }
        }
    }

    pub fn remove(&mut self, id: CommandId) -> Option<Command> {
        let pos = self.index.remove(&id)?;
        self.steps.remove(id);
        let removed = self.commands.remove(pos);
        for c in &self.commands[pos..] {
            if let Some(i) = self.index.get_mut(&c.id()) {
                *i -= 1;
            }
        }
        Some(removed)
    }

    /// Opens the next build step. The first call moves everything added so
    /// far into step 1 and then opens step 2.
    pub fn advance_step(&mut self) -> usize {
        self.steps.next();
        if self.steps.current() == 1 {
            for c in &self.commands {
                self.steps.add(c.id());
            }
            self.steps.next();
        }
        trace!("{}: now at step {}", self.id, self.steps.current());
        self.steps.current()
    }

    pub fn prev_step(&mut self) -> usize {
        self.steps.prev()
    }

    pub fn first_step(&mut self) -> usize {
        self.steps.first()
    }

    pub fn last_step(&mut self) -> usize {
        self.steps.last()
    }

    pub fn current_step(&self) -> usize {
        self.steps.current()
    }

    pub fn step_count(&self) -> usize {
        self.steps.count()
    }

    /// Commands of step `n` in insertion order; empty for `0` or past the end.
    pub fn step(&self, n: usize) -> Vec<&Command> {
        self.steps
            .step(n)
            .iter()
            .filter_map(|id| self.command(*id))
            .collect()
    }

    pub fn step_of(&self, id: CommandId) -> Option<usize> {
        self.steps.step_of(id)
    }

    pub fn move_to_step(&mut self, id: CommandId, n: usize) -> bool {
        self.index.contains_key(&id) && self.steps.move_to(id, n)
    }

    pub fn move_to_current_step(&mut self, id: CommandId) {
        if self.index.contains_key(&id) {
            self.steps.remove(id);
            self.steps.add(id);
        }
    }

    /// Deep copy under a new id; every command gets a fresh id and keeps its
    /// step.
    pub fn copy_with_new_ids(&self, new_id: &str, ids: &IdAllocator) -> Self {
        let mut copy = PartDefinition {
            id: new_id.trim().to_string(),
            commands: Vec::with_capacity(self.commands.len()),
            index: HashMap::new(),
            ..self.clone()
        };
        let mut remap = HashMap::new();
        for c in &self.commands {
            let fresh = c.copy_with_new_id(ids);
            remap.insert(c.id(), fresh.id());
            copy.index.insert(fresh.id(), copy.commands.len());
            copy.commands.push(fresh);
        }
        copy.steps = self.steps.remapped(&remap);
        copy
    }
}

/// Per-file line reading state: winding and `INVERTNEXT` tracking plus
/// header capture.
#[derive(Debug, Default)]
pub(crate) struct LineReader {
    invert_next: bool,
    clockwise: bool,
    described: bool,
}

impl LineReader {
    pub(crate) fn read(&mut self, line: &str, line_no: usize) -> crate::Result<CommandKind> {
        let invert = match line.split_whitespace().next() {
            Some("1") => std::mem::take(&mut self.invert_next),
            _ => self.clockwise,
        };
        parse_kind(line, line_no, invert)
    }

    /// Folds header and state lines into `part`. Returns what is left for
    /// the caller: geometry, colours, steps, MPD markers and unknown lines.
    pub(crate) fn absorb(&mut self, part: &mut PartDefinition, kind: CommandKind) -> Option<CommandKind> {
        match kind {
            CommandKind::BfcCw => self.clockwise = true,
            CommandKind::BfcCcw => self.clockwise = false,
            CommandKind::BfcInvertNext => self.invert_next = true,
            CommandKind::Author(a) => part.author = a,
            CommandKind::Name(n) => part.name = n,
            CommandKind::Category(c) => part.category = c,
            CommandKind::Keywords(k) => part.keywords.push(k),
            CommandKind::License(l) => part.license = l,
            CommandKind::FileType(k) => part.kind = k,
            CommandKind::History { date, .. } => {
                let today = Utc::now().date_naive();
                if date <= today && part.last_update.is_none_or(|d| date > d) {
                    part.last_update = Some(date);
                }
            }
            CommandKind::MetaUnknown(text) => {
                if !self.described {
                    part.description = text;
                    self.described = true;
                }
            }
            CommandKind::Comment(_) | CommandKind::Empty => {}
            other => return Some(other),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRICK: &str = "0 Brick  1 x  2
0 Name: 3004.dat
0 Author: James Jessiman
0 !LDRAW_ORG Part UPDATE 2004-03
0 !LICENSE Redistributable under CCAL version 2.0 : see CAreadme.txt
0 BFC CERTIFY CCW
0 !HISTORY 2002-05-07 [unknown] BFC Certification
0 !HISTORY 2004-03-10 [Steffen] Moved to official
0 !KEYWORDS classic
0 // a comment
1 16 0 24 0 1 0 0 0 -1 0 0 0 1 box5.dat
0 BFC INVERTNEXT
1 16 0 24 0 1 0 0 0 1 0 0 0 1 box5.dat
4 16 -20 24 -10 -16 20 -6 16 20 -6 20 24 -10
2 24 20 24 10 -20 24 10
";

    fn parse(text: &str) -> (PartDefinition, Diagnostics) {
        PartDefinition::parse("3004.dat", text, &IdAllocator::new())
    }

    #[test]
    fn header_metadata() {
        let (part, diags) = parse(BRICK);
        assert!(diags.is_empty());
        assert_eq!(part.description, "Brick  1 x  2");
        assert_eq!(part.name, "3004.dat");
        assert_eq!(part.author, "James Jessiman");
        assert_eq!(part.kind, PartKind::Official);
        assert_eq!(part.keywords, vec!["classic".to_string()]);
        assert_eq!(part.last_update, NaiveDate::from_ymd_opt(2004, 3, 10));
        assert_eq!(part.len(), 4);
    }

    #[test]
    fn invert_next_applies_to_one_reference() {
        let (part, _) = parse(BRICK);
        let inverts: Vec<bool> = part.references().map(|(_, r)| r.invert).collect();
        assert_eq!(inverts, vec![false, true]);
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (part, diags) = parse("2 16 0 0 0\n2 16 0 0 0 1 1 1\n9 what\n");
        assert_eq!(part.len(), 1);
        assert_eq!(diags.len(), 2);
        assert!(diags.has_errors());
        assert_eq!(diags.iter().next().map(|d| d.line), Some(1));
    }

    #[test]
    fn no_step_markers_means_no_steps() {
        let (part, _) = parse(BRICK);
        assert_eq!(part.current_step(), 0);
        assert!(part.step(1).is_empty());
    }

    #[test]
    fn first_step_collects_prior_commands() {
        let text = "2 16 0 0 0 1 1 1\n2 16 0 0 0 2 2 2\n2 16 0 0 0 3 3 3\n0 STEP\n2 16 0 0 0 4 4 4\n";
        let (part, _) = parse(text);
        assert_eq!(part.step(1).len(), 3);
        assert_eq!(part.step(2).len(), 1);
        assert_eq!(part.current_step(), 2);
        assert!(part.step(3).is_empty());
        assert!(part.step(0).is_empty());
    }

    #[test]
    fn replace_keeps_position_and_step() {
        let ids = IdAllocator::new();
        let mut part = PartDefinition::new("m.ldr", PartKind::Model);
        let a = Command::new(&ids, CommandKind::Comment("a".into()));
        let b = Command::new(&ids, CommandKind::Comment("b".into()));
        part.add_or_replace(a.clone());
        part.advance_step();
        part.add_or_replace(b.clone());

        let a2 = a.replacement(CommandKind::Comment("a2".into()));
        let old = part.add_or_replace(a2.clone());
        assert_eq!(old, Some(a.clone()));
        assert_eq!(part.commands()[0], a2);
        assert_eq!(part.step_of(a.id()), Some(1));
        assert_eq!(part.len(), 2);
    }

    #[test]
    fn remove_reindexes() {
        let ids = IdAllocator::new();
        let mut part = PartDefinition::new("m.ldr", PartKind::Model);
        let cmds: Vec<Command> = (0..3)
            .map(|i| Command::new(&ids, CommandKind::Comment(i.to_string())))
            .collect();
        for c in &cmds {
            part.add_or_replace(c.clone());
        }
        part.advance_step();
        assert_eq!(part.remove(cmds[0].id()), Some(cmds[0].clone()));
        assert_eq!(part.remove(cmds[0].id()), None);
        assert_eq!(part.command(cmds[2].id()), Some(&cmds[2]));
        assert_eq!(part.step(1).len(), 2);
    }

    #[test]
    fn steps_can_be_moved() {
        let ids = IdAllocator::new();
        let mut part = PartDefinition::new("m.ldr", PartKind::Model);
        let a = Command::new(&ids, CommandKind::Step);
        part.add_or_replace(a.clone());
        assert_eq!(part.advance_step(), 2);
        assert!(part.move_to_step(a.id(), 2));
        assert!(part.step(1).is_empty());
        assert_eq!(part.step(2).len(), 1);
        assert_eq!(part.prev_step(), 1);
        part.move_to_current_step(a.id());
        assert_eq!(part.step_of(a.id()), Some(1));
    }

    #[test]
    fn copies_get_fresh_ids() {
        let ids = IdAllocator::new();
        let text = "2 16 0 0 0 1 1 1\n0 STEP\n2 16 0 0 0 4 4 4\n";
        let (part, _) = PartDefinition::parse("a.ldr", text, &ids);
        let copy = part.copy_with_new_ids("b.ldr", &ids);
        assert_eq!(copy.id(), "b.ldr");
        assert_eq!(copy.len(), part.len());
        for (a, b) in part.commands().iter().zip(copy.commands()) {
            assert_ne!(a.id(), b.id());
            assert_eq!(a.kind(), b.kind());
            assert_eq!(part.step_of(a.id()), copy.step_of(b.id()));
        }
    }
}
