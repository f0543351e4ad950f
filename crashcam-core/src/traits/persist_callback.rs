/// Progress notifications of a persistence job.
///
/// Both methods run on the control thread: they are only invoked from
/// `PersistJob::dispatch` / `PersistJob::wait`, never from the worker.
pub trait PersistCallback {
    /// The post-trigger window has elapsed. When this returns the control
    /// thread must no longer touch the ring buffer or storage handed to the job.
    fn on_persisting_started(&mut self);

    /// The job finished. `success` is false for every kind of failure.
    fn on_persisting_stopped(&mut self, success: bool);
}
