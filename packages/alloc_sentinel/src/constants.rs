// A poisoned lock means the allocation accounting is in an unknowable state and must not be
// trusted for any further decision (we panic).
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - continued execution \
    is not safe because the allocation accounting can no longer be trusted";
