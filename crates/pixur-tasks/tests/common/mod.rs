#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::adapter::sqlite::SqliteAdapter;
use pixur_db::models::{
    FileSource, Mime, Pic, PicComment, PicIdent, PicIdentType, PicTag, PicVote, Tag, Thumbnail,
    User, Vote, tag_unique_name,
};
use pixur_db::tables::UsersPrimary;
use pixur_db::{Db, DbAdapter, Job, Opts, migrations};
use pixur_types::{CapSet, Capability, Configuration, Context, Status};
use sha2::{Digest, Sha256};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Stand in for the real password hasher; tests don't need argon2 costs.
pub fn hash_password(secret: &str) -> Result<String, Status> {
    Ok(format!("plain${}", secret))
}

pub fn verify_password(secret: &str, hash: &str) -> bool {
    hash.strip_prefix("plain$") == Some(secret)
}

/// A fresh in-memory database with the schema loaded, plus fixture helpers.
pub struct Container {
    pub db: Arc<dyn Db>,
    pub conf: Arc<Configuration>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_configuration(Configuration::default())
    }

    pub fn with_configuration(conf: Configuration) -> Self {
        let db = SqliteAdapter.open_for_test().unwrap();
        db.init_schema(&Context::new(), &migrations::schema(&SqliteAdapter))
            .unwrap();
        Self {
            db,
            conf: Arc::new(conf),
        }
    }

    pub fn adapter(&self) -> Arc<dyn DbAdapter> {
        self.db.adapter()
    }

    pub fn ctx(&self) -> Context {
        Context::new().with_configuration(Arc::clone(&self.conf))
    }

    pub fn ctx_for(&self, user: &User) -> Context {
        self.ctx().with_subject(user.user_id)
    }

    pub fn job(&self) -> Job<'_> {
        Job::new(self.db.as_ref(), &Context::new()).unwrap()
    }

    pub fn create_user(&self, caps: &[Capability]) -> User {
        let mut j = self.job();
        let user_id = j.alloc_id().unwrap();
        let now = now();
        let user = User {
            user_id,
            secret: hash_password("secret").unwrap(),
            ident: format!("user{}@example.com", user_id),
            created_ts: now,
            modified_ts: now,
            last_seen_ts: None,
            capability: CapSet::of(caps),
        };
        j.insert_user(&user).unwrap();
        j.commit().unwrap();
        user
    }

    pub fn find_user(&self, user_id: i64) -> Option<User> {
        let mut j = self.job();
        let users = j
            .find_users(&Opts {
                prefix: Some(
                    UsersPrimary {
                        user_id: Some(user_id),
                    }
                    .into(),
                ),
                ..Default::default()
            })
            .unwrap();
        users.into_iter().next()
    }

    /// A pic with a sha256 ident of random content, one thumbnail, and
    /// `uploader` recorded as its source.
    pub fn create_pic(&self, uploader: Option<&User>) -> Pic {
        let content: [u8; 32] = rand::random();
        let digest = Sha256::digest(content);

        let mut j = self.job();
        let pic_id = j.alloc_id().unwrap();
        let now = now();
        let pic = Pic {
            pic_id,
            file_size: content.len() as i64,
            mime: Mime::Png,
            width: 8,
            height: 4,
            created_ts: now,
            modified_ts: now,
            deletion_status: None,
            view_count: 0,
            source: uploader
                .map(|u| FileSource {
                    url: String::new(),
                    referrer: String::new(),
                    user_id: u.user_id,
                    created_ts: Some(now),
                })
                .into_iter()
                .collect(),
            file_name: vec![format!("{}.png", hex::encode(&digest[..6]))],
            thumbnail: vec![Thumbnail {
                index: 0,
                mime: Mime::Jpeg,
            }],
        };
        j.insert_pic(&pic).unwrap();
        j.insert_pic_ident(&PicIdent {
            pic_id,
            ident_type: PicIdentType::Sha256,
            value: digest.to_vec(),
        })
        .unwrap();
        j.commit().unwrap();
        pic
    }

    pub fn create_tag(&self, name: &str) -> Tag {
        let mut j = self.job();
        let tag_id = j.alloc_id().unwrap();
        let now = now();
        let tag = Tag {
            tag_id,
            name: tag_unique_name(name),
            usage_count: 0,
            created_ts: now,
            modified_ts: now,
        };
        j.insert_tag(&tag).unwrap();
        j.commit().unwrap();
        tag
    }

    /// Attaches `tag` to `pic`, bumping its usage count.
    pub fn tag_pic(&self, tag: &mut Tag, pic: &Pic) -> PicTag {
        let mut j = self.job();
        let now = now();
        tag.usage_count += 1;
        j.update_tag(tag).unwrap();
        let pt = PicTag {
            pic_id: pic.pic_id,
            tag_id: tag.tag_id,
            name: tag.name.clone(),
            created_ts: now,
            modified_ts: now,
        };
        j.insert_pic_tag(&pt).unwrap();
        j.commit().unwrap();
        pt
    }

    pub fn create_comment(&self, pic: &Pic, author: &User, parent: i64) -> PicComment {
        let mut j = self.job();
        let comment_id = j.alloc_id().unwrap();
        let now = now();
        let pc = PicComment {
            pic_id: pic.pic_id,
            comment_id,
            comment_parent_id: parent,
            text: format!("comment {}", comment_id),
            user_id: author.user_id,
            created_ts: now,
            modified_ts: now,
            ext: Default::default(),
        };
        j.insert_pic_comment(&pc).unwrap();
        j.commit().unwrap();
        pc
    }

    pub fn create_vote(&self, pic: &Pic, voter: &User) -> PicVote {
        let mut j = self.job();
        let now = now();
        let pv = PicVote {
            pic_id: pic.pic_id,
            user_id: voter.user_id,
            index: 0,
            vote: Vote::Up,
            created_ts: now,
            modified_ts: now,
        };
        j.insert_pic_vote(&pv).unwrap();
        j.commit().unwrap();
        pv
    }
}
