use std::sync::Arc;
use std::thread;

use rand::{Rng, SeedableRng};
use serial_test::serial;

use vm_kernel::{PagingPolicy, RawImage, UserProcess, VmKernel, PAGE_SIZE, STACK_PAGES};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// (free) + (pinned) + (resident unpinned) must equal the machine's frame
/// count in every reachable state.
fn assert_frame_conservation(kernel: &VmKernel) {
    assert_eq!(kernel.free_frames() + kernel.resident_frames(), kernel.total_frames());
    assert!(kernel.pinned_frames() <= kernel.resident_frames());
}

fn code_page(i: usize) -> Vec<u8> {
    (0..PAGE_SIZE).map(|j| (i * 31 + j) as u8).collect()
}

#[test]
fn swap_round_trip_preserves_written_bytes() {
    init_logging();
    let kernel = Arc::new(VmKernel::new(4, "it_swap_round_trip").unwrap());
    let proc_ = UserProcess::new(
        kernel.clone(),
        Arc::new(RawImage::new()),
        PagingPolicy::Demand,
    );
    assert!(proc_.load_sections());

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let pattern: Vec<u8> = (0..PAGE_SIZE).map(|_| rng.gen()).collect();
    assert_eq!(proc_.write_virtual_memory(0, &pattern, 0, PAGE_SIZE), PAGE_SIZE);

    // dirty enough other pages to push vpn 0 out
    for vpn in 1..6 {
        let filler = vec![vpn as u8; PAGE_SIZE];
        assert_eq!(
            proc_.write_virtual_memory(vpn * PAGE_SIZE, &filler, 0, PAGE_SIZE),
            PAGE_SIZE
        );
    }
    assert!(!kernel.is_resident(proc_.pid(), 0));
    assert!(kernel.swap_slots_outstanding() >= 1);
    assert!(kernel.evictions() >= 1);
    assert_frame_conservation(&kernel);

    let mut back = vec![0; PAGE_SIZE];
    assert_eq!(proc_.read_virtual_memory(0, &mut back, 0, PAGE_SIZE), PAGE_SIZE);
    assert_eq!(back, pattern);
    assert_frame_conservation(&kernel);
}

#[test]
fn clean_code_page_is_discarded_and_reloaded_from_the_image() {
    init_logging();
    let image = RawImage::new().with_section(".text", true, code_page(0));
    let original = code_page(0);
    let kernel = Arc::new(VmKernel::new(2, "it_clean_discard").unwrap());
    let proc_ = UserProcess::new(kernel.clone(), Arc::new(image), PagingPolicy::Demand);
    assert!(proc_.load_sections());

    let mut buf = vec![0; PAGE_SIZE];
    assert_eq!(proc_.read_virtual_memory(0, &mut buf, 0, PAGE_SIZE), PAGE_SIZE);
    assert_eq!(buf, original);

    // clean eviction pressure only: reads of never-written stack pages
    for vpn in 1..6 {
        let mut sink = [0u8; 1];
        assert_eq!(proc_.read_virtual_memory(vpn * PAGE_SIZE, &mut sink, 0, 1), 1);
    }
    assert!(!kernel.is_resident(proc_.pid(), 0));
    assert!(kernel.evictions() >= 1);
    // nothing was dirty, so no swap slot was ever consumed
    assert_eq!(kernel.swap_slots_outstanding(), 0);

    let mut again = vec![0; PAGE_SIZE];
    assert_eq!(proc_.read_virtual_memory(0, &mut again, 0, PAGE_SIZE), PAGE_SIZE);
    assert_eq!(again, original);
    assert_eq!(kernel.swap_slots_outstanding(), 0);
}

#[test]
fn no_frame_has_two_owners() {
    init_logging();
    let kernel = Arc::new(VmKernel::new(6, "it_no_double_ownership").unwrap());
    let a = UserProcess::new(
        kernel.clone(),
        Arc::new(RawImage::new()),
        PagingPolicy::Demand,
    );
    let b = UserProcess::new(
        kernel.clone(),
        Arc::new(RawImage::new()),
        PagingPolicy::Demand,
    );
    for vpn in 0..4 {
        assert!(kernel.handle_fault(a.pid(), vpn * PAGE_SIZE));
        assert!(kernel.handle_fault(b.pid(), vpn * PAGE_SIZE));
    }

    let mut owners = Vec::new();
    for ppn in 0..kernel.total_frames() {
        if let Some(owner) = kernel.frame_owner(ppn) {
            owners.push(owner);
        }
    }
    assert_eq!(owners.len(), kernel.resident_frames());
    let mut deduped = owners.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), owners.len());
    assert_frame_conservation(&kernel);
}

#[test]
fn write_crossing_into_read_only_section_is_cut_short() {
    init_logging();
    let image = RawImage::new()
        .with_section(".data", false, vec![0; PAGE_SIZE])
        .with_section(".text", true, code_page(1));
    let kernel = Arc::new(VmKernel::new(4, "it_short_transfer").unwrap());
    let proc_ = UserProcess::new(kernel.clone(), Arc::new(image), PagingPolicy::Demand);
    assert!(proc_.load_sections());

    // one writable page, then the read-only text page
    let data = vec![0xee; 2 * PAGE_SIZE];
    let n = proc_.write_virtual_memory(0, &data, 0, 2 * PAGE_SIZE);
    assert_eq!(n, PAGE_SIZE);

    // the read-only page is untouched
    let mut text = vec![0; PAGE_SIZE];
    assert_eq!(
        proc_.read_virtual_memory(PAGE_SIZE, &mut text, 0, PAGE_SIZE),
        PAGE_SIZE
    );
    assert_eq!(text, code_page(1));
}

#[test]
#[serial]
fn end_to_end_twelve_pages_on_four_frames() {
    init_logging();
    let image = RawImage::new().with_section(
        ".text",
        true,
        [code_page(0), code_page(1), code_page(2)].concat(),
    );
    let kernel = Arc::new(VmKernel::new(4, "it_end_to_end").unwrap());
    let proc_ = UserProcess::new(kernel.clone(), Arc::new(image), PagingPolicy::Demand);
    assert!(proc_.load_sections());
    assert_eq!(proc_.num_pages(), 3 + STACK_PAGES + 1);

    // touch every page in order: read the code, write the stack and the
    // argument page
    for vpn in 0..3 {
        let mut buf = vec![0; PAGE_SIZE];
        assert_eq!(
            proc_.read_virtual_memory(vpn * PAGE_SIZE, &mut buf, 0, PAGE_SIZE),
            PAGE_SIZE
        );
        assert_eq!(buf, code_page(vpn));
        assert_frame_conservation(&kernel);
    }
    for vpn in 3..proc_.num_pages() {
        let filler = vec![vpn as u8; PAGE_SIZE];
        assert_eq!(
            proc_.write_virtual_memory(vpn * PAGE_SIZE, &filler, 0, PAGE_SIZE),
            PAGE_SIZE
        );
        assert_frame_conservation(&kernel);
    }
    assert!(kernel.evictions() >= 1);

    // the code segment must still byte-match the image after the churn
    let mut code = vec![0; 3 * PAGE_SIZE];
    assert_eq!(
        proc_.read_virtual_memory(0, &mut code, 0, 3 * PAGE_SIZE),
        3 * PAGE_SIZE
    );
    assert_eq!(code, [code_page(0), code_page(1), code_page(2)].concat());

    // and the dirtied pages round-trip through swap
    for vpn in 3..proc_.num_pages() {
        let mut back = vec![0; PAGE_SIZE];
        assert_eq!(
            proc_.read_virtual_memory(vpn * PAGE_SIZE, &mut back, 0, PAGE_SIZE),
            PAGE_SIZE
        );
        assert_eq!(back, vec![vpn as u8; PAGE_SIZE]);
    }

    proc_.unload_sections();
    assert_eq!(kernel.free_frames(), kernel.total_frames());
    assert_eq!(kernel.swap_slots_outstanding(), 0);
}

#[test]
#[serial]
fn concurrent_processes_survive_eviction_pressure() {
    init_logging();
    let kernel = Arc::new(VmKernel::new(3, "it_concurrent_pressure").unwrap());

    let mut handles = Vec::new();
    for t in 0..2 {
        let kernel = kernel.clone();
        handles.push(thread::spawn(move || {
            let proc_ = UserProcess::new(
                kernel.clone(),
                Arc::new(RawImage::new()),
                PagingPolicy::Demand,
            );
            assert!(proc_.load_sections());
            for round in 0..20u8 {
                for vpn in 0..5 {
                    let pattern = vec![t as u8 ^ round ^ vpn as u8; 128];
                    assert_eq!(
                        proc_.write_virtual_memory(vpn * PAGE_SIZE, &pattern, 0, 128),
                        128
                    );
                    let mut back = vec![0; 128];
                    assert_eq!(
                        proc_.read_virtual_memory(vpn * PAGE_SIZE, &mut back, 0, 128),
                        128
                    );
                    assert_eq!(back, pattern);
                }
            }
            proc_.unload_sections();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(kernel.free_frames(), kernel.total_frames());
    assert_eq!(kernel.pinned_frames(), 0);
    assert_eq!(kernel.swap_slots_outstanding(), 0);
    assert!(kernel.evictions() > 0);
}
