//! Per-record layouts
//!
//! Fixed header sizes include the leading tag byte and every string length
//! prefix, so a buffer shorter than the header is rejected before any field
//! is read.

use bytes::Bytes;

use super::{Codec, CodecError, Reader, Writer};
use crate::model::{ForumRecord, TagRecord, ThreadRecord, UserRecord};

/// Layout tag for [`ThreadRecord`]
pub const THREAD_TAG: u8 = b'T';
/// Layout tag for [`ForumRecord`]
pub const FORUM_TAG: u8 = b'F';
/// Layout tag for [`TagRecord`]
pub const TAG_TAG: u8 = b'G';
/// Layout tag for [`UserRecord`]
pub const USER_TAG: u8 = b'U';

// tag + tid + fid + uid + views + replies + dateline + lastpost + status + 2 x u16 len
const THREAD_FIXED: usize = 1 + 8 + 4 + 8 + 4 + 4 + 8 + 8 + 1 + 2 + 2;
// tag + fid + parent + depth + order + threads + today + posts + status + u8 len + u16 len
const FORUM_FIXED: usize = 1 + 4 * 7 + 1 + 1 + 2;
// tag + tag_id + threads + views + status + 2 x u8 len
const TAG_FIXED: usize = 1 + 4 * 3 + 1 + 1 + 1;
// tag + uid + role + status + dateline + lastvisit + 2 x u8 len + u16 len
const USER_FIXED: usize = 1 + 8 + 1 + 1 + 8 + 8 + 1 + 1 + 2;

impl Codec for ThreadRecord {
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = Writer::new(
            THREAD_TAG,
            THREAD_FIXED + self.subject.len() + self.message.len(),
        );
        w.i64(self.tid);
        w.i32(self.fid);
        w.i64(self.uid);
        w.i32(self.views);
        w.i32(self.replies);
        w.i64(self.dateline);
        w.i64(self.lastpost);
        w.u8(self.status);
        w.str16("subject", &self.subject)?;
        w.str16("message", &self.message)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(buf, THREAD_TAG, THREAD_FIXED)?;
        let record = Self {
            tid: r.i64()?,
            fid: r.i32()?,
            uid: r.i64()?,
            views: r.i32()?,
            replies: r.i32()?,
            dateline: r.i64()?,
            lastpost: r.i64()?,
            status: r.u8()?,
            subject: r.str16("subject")?,
            message: r.str16("message")?,
        };
        r.finish()?;
        Ok(record)
    }
}

impl Codec for ForumRecord {
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = Writer::new(FORUM_TAG, FORUM_FIXED + self.name.len() + self.path.len());
        w.i32(self.fid);
        w.i32(self.parent);
        w.i32(self.depth);
        w.i32(self.display_order);
        w.i32(self.threads);
        w.i32(self.today);
        w.i32(self.posts);
        w.u8(self.status);
        w.str8("name", &self.name)?;
        w.str16("path", &self.path)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(buf, FORUM_TAG, FORUM_FIXED)?;
        let record = Self {
            fid: r.i32()?,
            parent: r.i32()?,
            depth: r.i32()?,
            display_order: r.i32()?,
            threads: r.i32()?,
            today: r.i32()?,
            posts: r.i32()?,
            status: r.u8()?,
            name: r.str8("name")?,
            path: r.str16("path")?,
        };
        r.finish()?;
        Ok(record)
    }
}

impl Codec for TagRecord {
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = Writer::new(TAG_TAG, TAG_FIXED + self.name.len() + self.slug.len());
        w.i32(self.tag_id);
        w.i32(self.threads);
        w.i32(self.views);
        w.u8(self.status);
        w.str8("name", &self.name)?;
        w.str8("slug", &self.slug)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(buf, TAG_TAG, TAG_FIXED)?;
        let record = Self {
            tag_id: r.i32()?,
            threads: r.i32()?,
            views: r.i32()?,
            status: r.u8()?,
            name: r.str8("name")?,
            slug: r.str8("slug")?,
        };
        r.finish()?;
        Ok(record)
    }
}

impl Codec for UserRecord {
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = Writer::new(
            USER_TAG,
            USER_FIXED + self.username.len() + self.email.len() + self.avatar.len(),
        );
        w.i64(self.uid);
        w.u8(self.role);
        w.u8(self.status);
        w.i64(self.dateline);
        w.i64(self.lastvisit);
        w.str8("username", &self.username)?;
        w.str8("email", &self.email)?;
        w.str16("avatar", &self.avatar)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::open(buf, USER_TAG, USER_FIXED)?;
        let record = Self {
            uid: r.i64()?,
            role: r.u8()?,
            status: r.u8()?,
            dateline: r.i64()?,
            lastvisit: r.i64()?,
            username: r.str8("username")?,
            email: r.str8("email")?,
            avatar: r.str16("avatar")?,
        };
        r.finish()?;
        Ok(record)
    }
}

// =============================================================================
// Tests
// =============================================================================
