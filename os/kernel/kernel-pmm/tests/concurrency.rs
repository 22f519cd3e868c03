use kernel_pmm::boot_alloc::BumpBootAlloc;
use kernel_pmm::{AllocFlags, ArenaFlags, ArenaInfo, PhysicalAddress, PhysicalMemoryManager};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const PAGE: u64 = 4096;
const THREADS: usize = 8;
const PAGES: u64 = 256;

fn shared_pmm() -> Arc<PhysicalMemoryManager> {
    let pmm = PhysicalMemoryManager::new();
    let mut boot = BumpBootAlloc::new(Box::leak(vec![0u8; 16 * 1024].into_boxed_slice()));
    let low = ArenaInfo::new("low", PhysicalAddress::new(0x10_0000), PAGES * PAGE, ArenaFlags::KMAP, 0);
    let high = ArenaInfo::new("high", PhysicalAddress::new(0x1000_0000), PAGES * PAGE, ArenaFlags::new(), 1);
    pmm.add_arena(low, &mut boot).unwrap();
    pmm.add_arena(high, &mut boot).unwrap();
    Arc::new(pmm)
}

#[test]
fn concurrent_allocations_never_overlap() {
    let pmm = shared_pmm();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pmm = Arc::clone(&pmm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut pages = Vec::new();
                for round in 0..16 {
                    if (t + round) % 2 == 0 {
                        if let Some((page, _)) = pmm.alloc_page(AllocFlags::ANY) {
                            pages.push(page);
                        }
                    } else {
                        pmm.alloc_pages(3, AllocFlags::ANY, &mut pages);
                    }
                }
                pages
            })
        })
        .collect();

    let all: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let addresses: HashSet<u64> = all
        .iter()
        .map(|&p| pmm.page_to_physical(p).unwrap().as_u64())
        .collect();
    assert_eq!(addresses.len(), all.len(), "a page was handed out twice");
    assert_eq!(pmm.free_page_count(), 2 * PAGES as usize - all.len());

    let allocated = all.len();
    assert_eq!(pmm.free(all), allocated);
    assert_eq!(pmm.free_page_count(), 2 * PAGES as usize);
}

#[test]
fn concurrent_alloc_and_free_keep_counts_exact() {
    let pmm = shared_pmm();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pmm = Arc::clone(&pmm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    let mut run = Vec::new();
                    if pmm.alloc_contiguous(4, AllocFlags::KMAP, 14, &mut run).is_some() {
                        assert_eq!(run.len(), 4);
                        assert_eq!(pmm.free(run), 4);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pmm.free_page_count(), 2 * PAGES as usize);
    pmm.for_each_arena(|arena| assert_eq!(arena.free_count(), arena.free_list_len()));
}
