use rand::Rng;

use super::{Balancer, ClientSource};
use crate::error::{CoreError, Result};

/// 随机负载均衡（均匀分布）
pub struct Random<S> {
    source: S,
}

impl<S: ClientSource> Random<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ClientSource> Balancer for Random<S> {
    type Handle = S::Handle;

    fn pick(&self) -> Result<S::Handle> {
        let handles = self.source.current();
        if handles.is_empty() {
            return Err(CoreError::NoClients);
        }
        let index = rand::thread_rng().gen_range(0..handles.len());
        Ok(handles[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::StaticClients;
    use std::collections::HashSet;

    #[test]
    fn picks_only_known_handles() {
        let balancer = Random::new(StaticClients::new(["a", "b", "c"]));
        let seen: HashSet<_> = (0..300).map(|_| balancer.pick().unwrap()).collect();
        assert!(seen.is_subset(&HashSet::from(["a", "b", "c"])));
        // 300 次均匀抽样几乎必然覆盖全部 3 个实例
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn empty_source_has_no_clients() {
        let balancer = Random::new(StaticClients::<u8>::new([]));
        assert!(balancer.pick().unwrap_err().is_no_clients());
    }
}
