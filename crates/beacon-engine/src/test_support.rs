//! Scripted in-memory `AssistantApi` for engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::{
    AssistantApi, ContentDelta, EngineError, MessageRole, RequiredAction, RunError,
    StreamingUpdate, ThreadHandle, TokenUsage, ToolOutput, UpdateStream,
};

/// Every remote call the fake has seen, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CreateThread(String),
    AppendMessage { thread: String, text: String },
    CreateRun { thread: String, assistant: String },
    SubmitToolOutputs { thread: String, run: String, outputs: Vec<ToolOutput> },
    CancelRun { thread: String, run: String },
    DeleteThread(String),
    RunsUsage(String),
    ModifyThread { thread: String, metadata: HashMap<String, String>, vector_store_ids: Vec<String> },
    CreateVectorStore(Vec<String>),
    AddVectorStoreFile { vector_store: String, file: String },
    RemoveVectorStoreFile { vector_store: String, file: String },
    DeleteVectorStore(String),
    DeleteFile(String),
}

/// One run stream. A hanging script never ends after its last update.
pub(crate) struct Script {
    updates: Vec<Result<StreamingUpdate, EngineError>>,
    hang: bool,
}

pub(crate) fn script(updates: Vec<StreamingUpdate>) -> Script {
    Script {
        updates: updates.into_iter().map(Ok).collect(),
        hang: false,
    }
}

pub(crate) fn hanging(updates: Vec<StreamingUpdate>) -> Script {
    Script {
        hang: true,
        ..script(updates)
    }
}

pub(crate) fn erroring(updates: Vec<StreamingUpdate>, error: EngineError) -> Script {
    let mut script = script(updates);
    script.updates.push(Err(error));
    script
}

pub(crate) fn message_created() -> StreamingUpdate {
    StreamingUpdate::MessageCreated {
        message_id: "msg_1".into(),
        role: MessageRole::Assistant,
    }
}

pub(crate) fn text(fragment: &str) -> StreamingUpdate {
    StreamingUpdate::ContentDelta(ContentDelta::Text(fragment.into()))
}

pub(crate) fn action(id: &str, name: &str, args: &str) -> RequiredAction {
    RequiredAction {
        tool_call_id: id.into(),
        function_name: name.into(),
        raw_arguments: args.into(),
    }
}

pub(crate) fn requires(run_id: &str, actions: Vec<RequiredAction>) -> StreamingUpdate {
    StreamingUpdate::RequiresAction {
        run_id: run_id.into(),
        actions,
    }
}

pub(crate) fn completed(run_id: &str) -> StreamingUpdate {
    StreamingUpdate::RunCompleted {
        run_id: run_id.into(),
        usage: None,
    }
}

pub(crate) fn failed(run_id: &str, message: &str) -> StreamingUpdate {
    StreamingUpdate::RunFailed {
        run_id: run_id.into(),
        error: Some(RunError {
            code: "server_error".into(),
            message: message.into(),
        }),
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    threads_created: AtomicUsize,
    vector_stores_created: AtomicUsize,
    runs: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Call>>,
    /// File membership of every live vector store.
    stores: Mutex<HashMap<String, HashSet<String>>>,
    create_delay: Duration,
    fail_create: bool,
    fail_cancel: bool,
    failing_adds: AtomicUsize,
    failing_modifies: AtomicUsize,
    usage: Vec<TokenUsage>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Streams handed out, in order, by run creation and tool submission.
    pub(crate) fn with_runs(self, scripts: Vec<Script>) -> Self {
        self.runs.lock().unwrap().extend(scripts);
        self
    }

    pub(crate) fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub(crate) fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// The next `n` vector-store file additions fail with a network error.
    pub(crate) fn fail_next_adds(&self, n: usize) {
        self.failing_adds.store(n, Ordering::SeqCst);
    }

    /// The next `n` thread modifications fail with a network error.
    pub(crate) fn fail_next_modifies(&self, n: usize) {
        self.failing_modifies.store(n, Ordering::SeqCst);
    }

    /// Files currently in `vector_store_id`, sorted. `None` once deleted.
    pub(crate) fn store_files(&self, vector_store_id: &str) -> Option<Vec<String>> {
        self.stores.lock().unwrap().get(vector_store_id).map(|files| {
            let mut files: Vec<String> = files.iter().cloned().collect();
            files.sort();
            files
        })
    }

    pub(crate) fn with_usage(mut self, usage: Vec<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn created_threads(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateThread(_)))
    }

    pub(crate) fn deleted_threads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteThread(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn submissions(&self) -> Vec<Vec<ToolOutput>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SubmitToolOutputs { outputs, .. } => Some(outputs),
                _ => None,
            })
            .collect()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_stream(&self) -> UpdateStream {
        let Some(script) = self.runs.lock().unwrap().pop_front() else {
            return stream::empty().boxed();
        };
        let updates = stream::iter(script.updates);
        if script.hang {
            updates.chain(stream::pending()).boxed()
        } else {
            updates.boxed()
        }
    }
}

#[async_trait]
impl AssistantApi for FakeApi {
    async fn create_thread(&self) -> Result<ThreadHandle, EngineError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create {
            return Err(EngineError::Network("connection refused".into()));
        }
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("thread_{n}");
        self.record(Call::CreateThread(id.clone()));
        Ok(ThreadHandle::new(id))
    }

    async fn append_user_message(&self, thread_id: &str, text: &str) -> Result<(), EngineError> {
        self.record(Call::AppendMessage {
            thread: thread_id.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn create_run_streaming(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<UpdateStream, EngineError> {
        self.record(Call::CreateRun {
            thread: thread_id.into(),
            assistant: assistant_id.into(),
        });
        Ok(self.next_stream())
    }

    async fn submit_tool_outputs_streaming(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<UpdateStream, EngineError> {
        self.record(Call::SubmitToolOutputs {
            thread: thread_id.into(),
            run: run_id.into(),
            outputs: outputs.to_vec(),
        });
        Ok(self.next_stream())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), EngineError> {
        self.record(Call::CancelRun {
            thread: thread_id.into(),
            run: run_id.into(),
        });
        if self.fail_cancel {
            return Err(EngineError::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), EngineError> {
        self.record(Call::DeleteThread(thread_id.into()));
        Ok(())
    }

    async fn runs_usage(&self, thread_id: &str) -> Result<Vec<TokenUsage>, EngineError> {
        self.record(Call::RunsUsage(thread_id.into()));
        Ok(self.usage.clone())
    }

    async fn modify_thread(
        &self,
        thread_id: &str,
        metadata: &HashMap<String, String>,
        vector_store_ids: &[String],
    ) -> Result<(), EngineError> {
        self.record(Call::ModifyThread {
            thread: thread_id.into(),
            metadata: metadata.clone(),
            vector_store_ids: vector_store_ids.to_vec(),
        });
        if Self::take_failure(&self.failing_modifies) {
            return Err(EngineError::Network("reset".into()));
        }
        Ok(())
    }

    async fn create_vector_store(&self, file_ids: &[String]) -> Result<String, EngineError> {
        self.record(Call::CreateVectorStore(file_ids.to_vec()));
        let n = self.vector_stores_created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("vs_{n}");
        self.stores
            .lock()
            .unwrap()
            .insert(id.clone(), file_ids.iter().cloned().collect());
        Ok(id)
    }

    async fn add_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError> {
        self.record(Call::AddVectorStoreFile {
            vector_store: vector_store_id.into(),
            file: file_id.into(),
        });
        if Self::take_failure(&self.failing_adds) {
            return Err(EngineError::Network("reset".into()));
        }
        match self.stores.lock().unwrap().get_mut(vector_store_id) {
            Some(files) => {
                files.insert(file_id.into());
                Ok(())
            }
            None => Err(EngineError::Api("HTTP 404: No vector store found".into())),
        }
    }

    async fn remove_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError> {
        self.record(Call::RemoveVectorStoreFile {
            vector_store: vector_store_id.into(),
            file: file_id.into(),
        });
        let removed = self
            .stores
            .lock()
            .unwrap()
            .get_mut(vector_store_id)
            .is_some_and(|files| files.remove(file_id));
        if removed {
            Ok(())
        } else {
            Err(EngineError::Api("HTTP 404: No file found".into()))
        }
    }

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<(), EngineError> {
        self.record(Call::DeleteVectorStore(vector_store_id.into()));
        self.stores.lock().unwrap().remove(vector_store_id);
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), EngineError> {
        self.record(Call::DeleteFile(file_id.into()));
        Ok(())
    }
}
