//! In-memory doubles for tests.
//!
//! [`RecordingGateway`] records every outbound call and can be told to fail
//! specific operations; [`MemoryBlobStore`] keeps blobs in a map.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use crate::blob::{BlobError, BlobResult, BlobStore};
use crate::gateway::{
    Destination, GatewayError, GatewayResult, NotificationGateway, OutboundMedia, OutboundText,
    SentMessage, TextFormat, ThreadHandle,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Text {
        to: Destination,
        message: OutboundText,
    },
    Media {
        to: Destination,
        media: OutboundMedia,
    },
    CreateThread {
        chat_id: i64,
        title: String,
        icon_color: u32,
    },
    DeleteThread {
        chat_id: i64,
        thread_id: i32,
    },
    Copy {
        from_chat: i64,
        message_id: i32,
        to: Destination,
    },
}

/// Gateway double that records calls.
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    next_id: AtomicI32,
    blocked: Mutex<HashSet<i64>>,
    missing_threads: Mutex<HashSet<i32>>,
    stuck_threads: Mutex<HashSet<i32>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_create_thread: AtomicBool,
    fail_delete_thread: AtomicBool,
    reject_html: AtomicBool,
    fail_media: AtomicBool,
    fetched: Mutex<Vec<String>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(100),
            blocked: Mutex::new(HashSet::new()),
            missing_threads: Mutex::new(HashSet::new()),
            stuck_threads: Mutex::new(HashSet::new()),
            files: Mutex::new(HashMap::new()),
            fail_create_thread: AtomicBool::new(false),
            fail_delete_thread: AtomicBool::new(false),
            reject_html: AtomicBool::new(false),
            fail_media: AtomicBool::new(false),
            fetched: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sends to this user fail with `Blocked`.
    pub fn block_user(&self, user_id: i64) {
        self.blocked.lock().unwrap().insert(user_id);
    }

    /// Makes this thread behave as deleted out-of-band.
    pub fn remove_thread(&self, thread_id: i32) {
        self.missing_threads.lock().unwrap().insert(thread_id);
    }

    /// Registers content behind a file handle.
    pub fn add_file(&self, handle: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(handle.to_string(), data.to_vec());
    }

    pub fn fail_create_thread(&self, fail: bool) {
        self.fail_create_thread.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_thread(&self, fail: bool) {
        self.fail_delete_thread.store(fail, Ordering::SeqCst);
    }

    /// Makes deleting this one thread fail with a transport error.
    pub fn fail_delete_for(&self, thread_id: i32) {
        self.stuck_threads.lock().unwrap().insert(thread_id);
    }

    /// Rejects HTML-formatted text, as a transport does on malformed markup.
    pub fn reject_html(&self, reject: bool) {
        self.reject_html.store(reject, Ordering::SeqCst);
    }

    pub fn fail_media(&self, fail: bool) {
        self.fail_media.store(fail, Ordering::SeqCst);
    }

    /// File handles passed to `fetch_file`, in order.
    pub fn fetched_files(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Text bodies delivered to a destination, in order.
    pub fn texts_to(&self, to: Destination) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Text { to: dest, message } if dest == to => Some(message.text),
                _ => None,
            })
            .collect()
    }

    /// Every text body regardless of destination.
    pub fn all_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Text { message, .. } => Some(message.text),
                _ => None,
            })
            .collect()
    }

    pub fn media_to(&self, to: Destination) -> Vec<OutboundMedia> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Media { to: dest, media } if dest == to => Some(media),
                _ => None,
            })
            .collect()
    }

    pub fn created_threads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateThread { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_threads(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::DeleteThread { thread_id, .. } => Some(thread_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_destination(&self, to: Destination) -> GatewayResult<()> {
        match to {
            Destination::User(id) if self.blocked.lock().unwrap().contains(&id) => {
                Err(GatewayError::Blocked)
            }
            Destination::Thread { thread_id, .. }
                if self.missing_threads.lock().unwrap().contains(&thread_id) =>
            {
                Err(GatewayError::ThreadNotFound)
            }
            _ => Ok(()),
        }
    }

    fn receipt(&self, to: Destination) -> SentMessage {
        SentMessage {
            chat_id: to.chat_id(),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_text(&self, to: Destination, message: OutboundText) -> GatewayResult<SentMessage> {
        self.check_destination(to)?;
        if message.format == TextFormat::Html && self.reject_html.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("can't parse entities".into()));
        }
        self.record(GatewayCall::Text { to, message });
        Ok(self.receipt(to))
    }

    async fn send_media(&self, to: Destination, media: OutboundMedia) -> GatewayResult<SentMessage> {
        self.check_destination(to)?;
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("media rejected".into()));
        }
        if media.caption.is_some()
            && media.format == TextFormat::Html
            && self.reject_html.load(Ordering::SeqCst)
        {
            return Err(GatewayError::Transport("can't parse entities".into()));
        }
        self.record(GatewayCall::Media { to, media });
        Ok(self.receipt(to))
    }

    async fn create_thread(&self, chat_id: i64, title: &str, icon_color: u32) -> GatewayResult<ThreadHandle> {
        if self.fail_create_thread.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("not enough rights to create a topic".into()));
        }
        self.record(GatewayCall::CreateThread {
            chat_id,
            title: title.to_string(),
            icon_color,
        });
        Ok(ThreadHandle {
            thread_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: title.to_string(),
        })
    }

    async fn delete_thread(&self, chat_id: i64, thread_id: i32) -> GatewayResult<()> {
        if self.missing_threads.lock().unwrap().contains(&thread_id) {
            return Err(GatewayError::ThreadNotFound);
        }
        if self.fail_delete_thread.load(Ordering::SeqCst)
            || self.stuck_threads.lock().unwrap().contains(&thread_id)
        {
            return Err(GatewayError::Transport("flood wait".into()));
        }
        self.record(GatewayCall::DeleteThread { chat_id, thread_id });
        self.missing_threads.lock().unwrap().insert(thread_id);
        Ok(())
    }

    async fn copy_message(&self, from_chat: i64, message_id: i32, to: Destination) -> GatewayResult<SentMessage> {
        self.check_destination(to)?;
        self.record(GatewayCall::Copy {
            from_chat,
            message_id,
            to,
        });
        Ok(self.receipt(to))
    }

    async fn fetch_file(&self, handle: &str) -> GatewayResult<Vec<u8>> {
        self.fetched.lock().unwrap().push(handle.to_string());
        self.files
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| GatewayError::Transport(format!("file not found: {}", handle)))
    }
}

/// Blob store double.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> BlobResult<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("storage offline".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(format!("mem://{}", key))
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
