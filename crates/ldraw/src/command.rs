use chrono::NaiveDate;
use glam::DVec3;

use crate::color::{ColorRef, ColourDefinition};
use crate::ids::{CommandId, IdAllocator};
use crate::part::PartKind;
use crate::transform::Transform;

/// A type 1 line: placement of another part or sub-model.
#[derive(Debug, Clone, PartialEq)]
pub struct PartReference {
    /// Referenced file name as written, e.g. `3001.dat` or `s\3001s01.dat`.
    pub part_id: String,
    pub color: ColorRef,
    pub transform: Transform,
    /// Set when the line followed a `BFC INVERTNEXT`.
    pub invert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Reference(PartReference),
    Line {
        color: ColorRef,
        p1: DVec3,
        p2: DVec3,
    },
    Triangle {
        color: ColorRef,
        points: [DVec3; 3],
        invert: bool,
    },
    Quad {
        color: ColorRef,
        points: [DVec3; 4],
        invert: bool,
    },
    AuxLine {
        color: ColorRef,
        p1: DVec3,
        p2: DVec3,
        c1: DVec3,
        c2: DVec3,
    },
    Colour(ColourDefinition),
    Step,
    BfcCcw,
    BfcCw,
    BfcInvertNext,
    Comment(String),
    Keywords(String),
    Category(String),
    History { date: NaiveDate, text: String },
    MetaUnknown(String),
    Empty,
    FileType(PartKind),
    Name(String),
    Author(String),
    License(String),
    /// `0 FILE name`: start of a block in a multi-part document.
    File(String),
    /// `0 NOFILE`: end of a block in a multi-part document.
    NoFile,
    Unknown(String),
}

impl CommandKind {
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            CommandKind::Reference(_)
                | CommandKind::Line { .. }
                | CommandKind::Triangle { .. }
                | CommandKind::Quad { .. }
                | CommandKind::AuxLine { .. }
        )
    }

    /// Short keyword used in listings.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Reference(_) => "reference",
            CommandKind::Line { .. } => "line",
            CommandKind::Triangle { .. } => "triangle",
            CommandKind::Quad { .. } => "quad",
            CommandKind::AuxLine { .. } => "auxline",
            CommandKind::Colour(_) => "colour",
            CommandKind::Step => "step",
            CommandKind::BfcCcw => "bfc-ccw",
            CommandKind::BfcCw => "bfc-cw",
            CommandKind::BfcInvertNext => "bfc-invertnext",
            CommandKind::Comment(_) => "comment",
            CommandKind::Keywords(_) => "keywords",
            CommandKind::Category(_) => "category",
            CommandKind::History { .. } => "history",
            CommandKind::MetaUnknown(_) => "meta",
            CommandKind::Empty => "empty",
            CommandKind::FileType(_) => "filetype",
            CommandKind::Name(_) => "name",
            CommandKind::Author(_) => "author",
            CommandKind::License(_) => "license",
            CommandKind::File(_) => "file",
            CommandKind::NoFile => "nofile",
            CommandKind::Unknown(_) => "unknown",
        }
    }
}

/// One parsed line with its process-unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    id: CommandId,
    kind: CommandKind,
}

impl Command {
    pub fn new(ids: &IdAllocator, kind: CommandKind) -> Self {
        Self {
            id: ids.command_id(),
            kind,
        }
    }

    /// A new command that takes over this command's id, used with
    /// [`PartDefinition::add_or_replace`](crate::PartDefinition::add_or_replace).
    pub fn replacement(&self, kind: CommandKind) -> Self {
        Self { id: self.id, kind }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn into_kind(self) -> CommandKind {
        self.kind
    }

    pub fn reference(&self) -> Option<&PartReference> {
        match &self.kind {
            CommandKind::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Same command with a fresh id.
    pub fn copy_with_new_id(&self, ids: &IdAllocator) -> Self {
        Self::new(ids, self.kind.clone())
    }
}
