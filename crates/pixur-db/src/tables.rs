//! Table descriptors: where each model lives, which of its fields are
//! materialized as key columns, and the typed indexes over them.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::builder::Idx;
use crate::models::{
    Pic, PicComment, PicIdent, PicTag, PicVote, Tag, User, UserEvent, tag_unique_name, ts_nanos,
    user_unique_ident,
};
use crate::Value;

/// Storage type of a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColKind {
    BigInt,
    Int,
    Blob,
}

/// Static schema of one table. The `data` column is implied.
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub cols: &'static [(&'static str, ColKind)],
    pub primary: &'static [&'static str],
    pub unique: &'static [&'static [&'static str]],
    pub indexes: &'static [&'static [&'static str]],
}

/// A model persisted in its own table.
pub trait Table: Serialize + DeserializeOwned {
    const DEF: &'static TableDef;

    /// Key column values, in the order of `DEF.cols`.
    fn key_vals(&self) -> Vec<Value>;

    /// Unique key identifying this row.
    fn primary_key(&self) -> Idx;
}

/// Column names of a table, in declaration order.
pub fn col_names(def: &TableDef) -> Vec<&'static str> {
    def.cols.iter().map(|(name, _)| *name).collect()
}

// Values are only meaningful up to the first unset field.
fn prefix_vals(vals: Vec<Option<Value>>) -> Vec<Value> {
    vals.into_iter().map_while(|v| v).collect()
}

macro_rules! index {
    ($(#[$meta:meta])* $name:ident, $unique:literal, $cols:expr, { $($field:ident: $ty:ty),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $(pub $field: Option<$ty>,)+
        }

        impl From<$name> for Idx {
            fn from(idx: $name) -> Idx {
                let vals = prefix_vals(vec![$(idx.$field.map(Value::from)),+]);
                if $unique {
                    Idx::unique($cols, vals)
                } else {
                    Idx::new($cols, vals)
                }
            }
        }
    };
}

pub const PICS: TableDef = TableDef {
    name: "Pics",
    cols: &[("pic_id", ColKind::BigInt)],
    primary: &["pic_id"],
    unique: &[],
    indexes: &[],
};

index!(PicsPrimary, true, PICS.primary, { pic_id: i64 });

impl Table for Pic {
    const DEF: &'static TableDef = &PICS;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.pic_id.into()]
    }

    fn primary_key(&self) -> Idx {
        PicsPrimary {
            pic_id: Some(self.pic_id),
        }
        .into()
    }
}

pub const TAGS: TableDef = TableDef {
    name: "Tags",
    cols: &[("tag_id", ColKind::BigInt), ("name", ColKind::Blob)],
    primary: &["tag_id"],
    unique: &[&["name"]],
    indexes: &[],
};

index!(TagsPrimary, true, TAGS.primary, { tag_id: i64 });
index!(
    /// Lookup by normalized name; see [`tag_unique_name`].
    TagsName, true, TAGS.unique[0], { name: String }
);

impl Table for Tag {
    const DEF: &'static TableDef = &TAGS;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.tag_id.into(), tag_unique_name(&self.name).into()]
    }

    fn primary_key(&self) -> Idx {
        TagsPrimary {
            tag_id: Some(self.tag_id),
        }
        .into()
    }
}

pub const PIC_TAGS: TableDef = TableDef {
    name: "PicTags",
    cols: &[("pic_id", ColKind::BigInt), ("tag_id", ColKind::BigInt)],
    primary: &["pic_id", "tag_id"],
    unique: &[],
    indexes: &[],
};

index!(PicTagsPrimary, true, PIC_TAGS.primary, { pic_id: i64, tag_id: i64 });

impl Table for PicTag {
    const DEF: &'static TableDef = &PIC_TAGS;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.pic_id.into(), self.tag_id.into()]
    }

    fn primary_key(&self) -> Idx {
        PicTagsPrimary {
            pic_id: Some(self.pic_id),
            tag_id: Some(self.tag_id),
        }
        .into()
    }
}

pub const PIC_COMMENTS: TableDef = TableDef {
    name: "PicComments",
    cols: &[("pic_id", ColKind::BigInt), ("comment_id", ColKind::BigInt)],
    primary: &["pic_id", "comment_id"],
    unique: &[],
    indexes: &[],
};

index!(PicCommentsPrimary, true, PIC_COMMENTS.primary, { pic_id: i64, comment_id: i64 });

impl Table for PicComment {
    const DEF: &'static TableDef = &PIC_COMMENTS;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.pic_id.into(), self.comment_id.into()]
    }

    fn primary_key(&self) -> Idx {
        PicCommentsPrimary {
            pic_id: Some(self.pic_id),
            comment_id: Some(self.comment_id),
        }
        .into()
    }
}

pub const PIC_VOTES: TableDef = TableDef {
    name: "PicVotes",
    cols: &[
        ("pic_id", ColKind::BigInt),
        ("user_id", ColKind::BigInt),
        ("index", ColKind::BigInt),
    ],
    primary: &["pic_id", "user_id", "index"],
    unique: &[],
    indexes: &[],
};

index!(PicVotesPrimary, true, PIC_VOTES.primary, { pic_id: i64, user_id: i64, index: i64 });

impl Table for PicVote {
    const DEF: &'static TableDef = &PIC_VOTES;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.pic_id.into(), self.user_id.into(), self.index.into()]
    }

    fn primary_key(&self) -> Idx {
        PicVotesPrimary {
            pic_id: Some(self.pic_id),
            user_id: Some(self.user_id),
            index: Some(self.index),
        }
        .into()
    }
}

pub const PIC_IDENTS: TableDef = TableDef {
    name: "PicIdents",
    cols: &[
        ("pic_id", ColKind::BigInt),
        ("type", ColKind::Int),
        ("value", ColKind::Blob),
    ],
    primary: &["pic_id", "type", "value"],
    unique: &[],
    indexes: &[&["type", "value"]],
};

index!(PicIdentsPrimary, true, PIC_IDENTS.primary, { pic_id: i64, ident_type: i64, value: Vec<u8> });
index!(
    /// Finds pics by content hash. Not unique: hashes may collide.
    PicIdentsIdent, false, PIC_IDENTS.indexes[0], { ident_type: i64, value: Vec<u8> }
);

impl Table for PicIdent {
    const DEF: &'static TableDef = &PIC_IDENTS;

    fn key_vals(&self) -> Vec<Value> {
        vec![
            self.pic_id.into(),
            self.ident_type.as_i64().into(),
            self.value.clone().into(),
        ]
    }

    fn primary_key(&self) -> Idx {
        PicIdentsPrimary {
            pic_id: Some(self.pic_id),
            ident_type: Some(self.ident_type.as_i64()),
            value: Some(self.value.clone()),
        }
        .into()
    }
}

pub const USERS: TableDef = TableDef {
    name: "Users",
    cols: &[("user_id", ColKind::BigInt), ("ident", ColKind::Blob)],
    primary: &["user_id"],
    unique: &[&["ident"]],
    indexes: &[],
};

index!(UsersPrimary, true, USERS.primary, { user_id: i64 });
index!(
    /// Lookup by lowercased ident; see [`user_unique_ident`].
    UsersIdent, true, USERS.unique[0], { ident: String }
);

impl Table for User {
    const DEF: &'static TableDef = &USERS;

    fn key_vals(&self) -> Vec<Value> {
        vec![self.user_id.into(), user_unique_ident(&self.ident).into()]
    }

    fn primary_key(&self) -> Idx {
        UsersPrimary {
            user_id: Some(self.user_id),
        }
        .into()
    }
}

pub const USER_EVENTS: TableDef = TableDef {
    name: "UserEvents",
    cols: &[
        ("user_id", ColKind::BigInt),
        ("created_ts", ColKind::BigInt),
        ("index", ColKind::BigInt),
    ],
    primary: &["user_id", "created_ts", "index"],
    unique: &[],
    indexes: &[],
};

index!(UserEventsPrimary, true, USER_EVENTS.primary, { user_id: i64, created_ts: i64, index: i64 });

impl Table for UserEvent {
    const DEF: &'static TableDef = &USER_EVENTS;

    fn key_vals(&self) -> Vec<Value> {
        vec![
            self.user_id.into(),
            ts_nanos(self.created_ts).into(),
            self.index.into(),
        ]
    }

    fn primary_key(&self) -> Idx {
        UserEventsPrimary {
            user_id: Some(self.user_id),
            created_ts: Some(ts_nanos(self.created_ts)),
            index: Some(self.index),
        }
        .into()
    }
}

/// Every model table, in creation order.
pub static ALL_TABLES: &[&TableDef] = &[
    &PICS,
    &TAGS,
    &PIC_TAGS,
    &PIC_COMMENTS,
    &PIC_VOTES,
    &PIC_IDENTS,
    &USERS,
    &USER_EVENTS,
];
