//! Paged performance queries.
//!
//! Large inventories are queried in consecutive slices of `page_size`
//! objects; one oversized request fails outright on the server. Paging is by
//! object count, so inventories with many series per object need a smaller
//! page size.

use crate::error::Result;
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::types::{InventoryObject, PerfEntityMetric};
use tracing::debug;

/// Pagination strategy, chosen from the configured page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfFetcher {
    /// One query for the whole inventory
    SinglePage,
    /// Queries of at most `page_size` objects
    MultiPage { page_size: usize },
}

impl PerfFetcher {
    /// A page size of zero disables pagination.
    pub fn new(page_size: usize) -> Self {
        match page_size {
            0 => Self::SinglePage,
            page_size => Self::MultiPage { page_size },
        }
    }

    pub fn inv_iterator<'a>(
        &self,
        gateway: &'a dyn Gateway,
        objects: &'a [InventoryObject],
        max_sample: i32,
    ) -> InvIterator<'a> {
        let page_size = match *self {
            Self::SinglePage => objects.len(),
            Self::MultiPage { page_size } => page_size,
        };
        let num_pages = if objects.is_empty() { 0 } else { objects.len().div_ceil(page_size) };
        InvIterator { gateway, objects, max_sample, page_size, page_num: 0, num_pages }
    }
}

/// Walks an inventory one page at a time.
pub struct InvIterator<'a> {
    gateway: &'a dyn Gateway,
    objects: &'a [InventoryObject],
    max_sample: i32,
    page_size: usize,
    page_num: usize,
    num_pages: usize,
}

impl<'a> InvIterator<'a> {
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn has_next(&self) -> bool {
        self.page_num < self.num_pages
    }

    /// Query the next page.
    ///
    /// Issues exactly one gateway call and reports whether more pages remain.
    /// Past the last page it returns an empty page without calling out.
    pub async fn next_inv_page(&mut self) -> Result<(bool, Vec<PerfEntityMetric>)> {
        if !self.has_next() {
            return Ok((false, Vec::new()));
        }
        let start = self.page_num * self.page_size;
        let end = (start + self.page_size).min(self.objects.len());
        self.page_num += 1;

        debug!(page = self.page_num, pages = self.num_pages, start, end, "Querying perf page");
        let page = self
            .gateway
            .query_perf(&self.objects[start..end], self.max_sample)
            .await
            .inspect_err(|_| metrics::record_gateway_error("queryPerf"))?;
        metrics::record_page();
        Ok((self.has_next(), page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FakeGateway;
    use crate::types::{Mor, PerfMetricId};

    fn objects(n: usize) -> Vec<InventoryObject> {
        (0..n)
            .map(|i| {
                let mut obj = InventoryObject::new(Mor::new("VirtualMachine", format!("vm-{i}")));
                obj.metric_ids = vec![PerfMetricId { counter_id: 1, instance: String::new() }];
                obj
            })
            .collect()
    }

    async fn drain(
        fetcher: PerfFetcher,
        gateway: &FakeGateway,
        objs: &[InventoryObject],
    ) -> Vec<String> {
        let mut it = fetcher.inv_iterator(gateway, objs, 1);
        let mut entities = Vec::new();
        let mut more = it.has_next();
        while more {
            let (next, page) = it.next_inv_page().await.unwrap();
            more = next;
            entities.extend(page.into_iter().map(|m| m.entity.value));
        }
        entities
    }

    #[tokio::test]
    async fn test_multi_page_slices() {
        let gateway = FakeGateway::new(1);
        let objs = objects(10);
        let entities = drain(PerfFetcher::new(3), &gateway, &objs).await;

        assert_eq!(gateway.perf_calls(), vec![3, 3, 3, 1]);
        assert_eq!(entities.len(), 10);
    }

    #[tokio::test]
    async fn test_single_page() {
        let gateway = FakeGateway::new(2);
        let objs = objects(7);
        let entities = drain(PerfFetcher::new(0), &gateway, &objs).await;

        assert_eq!(gateway.perf_calls(), vec![7]);
        assert_eq!(entities.len(), 14);
    }

    #[tokio::test]
    async fn test_pagination_equivalence() {
        let objs = objects(23);
        let single_gateway = FakeGateway::new(3);
        let mut expected = drain(PerfFetcher::SinglePage, &single_gateway, &objs).await;
        expected.sort();

        for page_size in 1..=25 {
            let gateway = FakeGateway::new(3);
            let mut actual = drain(PerfFetcher::new(page_size), &gateway, &objs).await;
            actual.sort();
            assert_eq!(actual, expected, "page size {page_size}");
            assert_eq!(gateway.perf_calls().len(), objs.len().div_ceil(page_size));
        }
    }

    #[tokio::test]
    async fn test_empty_inventory_issues_no_calls() {
        let gateway = FakeGateway::new(1);
        for fetcher in [PerfFetcher::SinglePage, PerfFetcher::new(5)] {
            let mut it = fetcher.inv_iterator(&gateway, &[], 1);
            assert_eq!(it.num_pages(), 0);
            assert_eq!(it.next_inv_page().await.unwrap(), (false, Vec::new()));
        }
        assert!(gateway.perf_calls().is_empty());
    }

    #[tokio::test]
    async fn test_page_error_is_returned() {
        let gateway = FakeGateway::new(1).with_failing_perf_call(1);
        let objs = objects(4);
        let mut it = PerfFetcher::new(2).inv_iterator(&gateway, &objs, 1);

        assert!(it.next_inv_page().await.unwrap().0);
        assert!(it.next_inv_page().await.is_err());
    }
}
