use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Balancer, ClientSource};
use crate::error::{CoreError, Result};

/// 轮询负载均衡
///
/// 游标单调递增，按当前快照长度取模；实例集合变化后游标按新长度重新解释。
/// 对固定的 K 个实例做 N 次选择，每个实例被选中 ⌊N/K⌋ 或 ⌈N/K⌉ 次。
pub struct RoundRobin<S> {
    source: S,
    cursor: AtomicUsize,
}

impl<S: ClientSource> RoundRobin<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: ClientSource> Balancer for RoundRobin<S> {
    type Handle = S::Handle;

    fn pick(&self) -> Result<S::Handle> {
        let handles = self.source.current();
        if handles.is_empty() {
            return Err(CoreError::NoClients);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % handles.len();
        Ok(handles[index].clone())
    }
}
