mod common;

use common::MockDevice;
use passage::{
    BindTableEntry, BindingKind, BindingSlot, BufferUsage, Format, PipelineSignature, Profiler,
    RenderGraph, ResourceState, ResourceTags, TextureUsage,
};
use std::{
    cell::Cell,
    rc::Rc,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn new_graph(device: &Rc<MockDevice>, frames_in_flight: usize) -> RenderGraph {
    RenderGraph::new(device.clone(), |opts| {
        opts.frames_in_flight = frames_in_flight;
    })
}

/// A color target written by a render pass and read back by a copy pass.
fn add_write_read(graph: &mut RenderGraph, name: &str, tags: ResourceTags) {
    let tex = graph.create_texture(|t| {
        t.set_name(name)
            .set_extent(256, 256)
            .set_usage(TextureUsage::RENDER_TARGET | TextureUsage::COPY_SRC);
        if !tags.is_empty() {
            t.set_tags(tags);
        }
    });
    graph.add_render_pass(
        |p| {
            p.set_name(&format!("{name}.draw")).write(tex);
        },
        |_| {},
    );
    graph.add_copy_pass(
        |p| {
            p.set_name(&format!("{name}.readback")).read(tex);
        },
        |_| {},
    );
}

#[test]
fn unreferenced_nodes_are_culled() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let used = graph.create_texture(|t| {
        t.set_name("used").set_usage(TextureUsage::RENDER_TARGET);
    });
    graph.create_texture(|t| {
        t.set_name("unused");
    });
    graph.add_render_pass(
        |p| {
            p.set_name("draw").write(used);
        },
        |_| {},
    );

    let lone_ran = Rc::new(Cell::new(false));
    let orphan_ran = Rc::new(Cell::new(false));
    {
        let lone_ran = lone_ran.clone();
        graph.add_present_pass(
            |p| {
                p.set_name("present");
            },
            move |_| lone_ran.set(true),
        );
    }
    {
        let orphan_ran = orphan_ran.clone();
        // zero edges and not allowed to stand alone
        graph.add_compute_pass(
            |p| {
                p.set_name("orphan");
            },
            move |_| orphan_ran.set(true),
        );
    }

    assert!(graph.compile());
    graph.execute(None);

    // only the referenced texture got a backing
    assert_eq!(device.created_textures(), 1);
    assert!(lone_ran.get());
    assert!(!orphan_ran.get());
}

#[test]
fn compile_reports_whether_any_pass_survived() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    graph.add_compute_pass(
        |p| {
            p.set_name("orphan");
        },
        |_| {},
    );
    assert!(!graph.compile());
    graph.execute(None);

    graph.add_present_pass(
        |p| {
            p.set_name("present");
        },
        |_| {},
    );
    assert!(graph.compile());
}

#[test]
fn write_then_read_emits_one_transition_before_the_reader() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let signature = Rc::new(PipelineSignature {
        name: "blit".to_string(),
        slots: vec![BindingSlot {
            name: "src".to_string(),
            kind: BindingKind::SampledTexture,
            slot: 0,
        }],
    });

    let tex = graph.create_texture(|t| {
        t.set_name("color")
            .set_extent(64, 64)
            .set_usage(TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED);
    });
    graph.add_render_pass(
        |p| {
            p.set_name("draw").write(tex);
        },
        |_| {},
    );
    graph.add_render_pass(
        |p| {
            p.set_name("blit").set_pipeline(signature.clone()).read("src", tex);
        },
        |_| {},
    );
    graph.execute(None);

    // one shared backing, one sampling view
    assert_eq!(device.created_textures(), 1);
    assert_eq!(device.created_views(), 1);

    let log = device.barrier_log();
    assert_eq!(log.len(), 2);
    // draw initializes the fresh backing
    assert_eq!(log[0].0.len(), 1);
    assert_eq!(log[0].0[0].src, ResourceState::UNDEFINED);
    assert_eq!(log[0].0[0].dst, ResourceState::RENDER_TARGET);
    // blit sees exactly one write→read transition
    assert_eq!(log[1].0.len(), 1);
    assert_eq!(log[1].0[0].src, ResourceState::RENDER_TARGET);
    assert_eq!(log[1].0[0].dst, ResourceState::SHADER_RESOURCE);

    let writes = device.bind_table_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 1);
    assert_eq!(writes[0][0].slot, 0);
    assert!(matches!(writes[0][0].entry, BindTableEntry::TextureView(_)));
}

#[test]
fn buffer_write_then_indirect_consume_reuses_one_backing() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let signature = Rc::new(PipelineSignature {
        name: "build_args".to_string(),
        slots: vec![BindingSlot {
            name: "args".to_string(),
            kind: BindingKind::StorageBuffer,
            slot: 0,
        }],
    });

    for _ in 0..2 {
        let args = graph.create_buffer(|b| {
            b.set_name("draw_args")
                .set_size(4 * 1024)
                .set_usage(BufferUsage::STORAGE | BufferUsage::INDIRECT);
        });
        let sig = signature.clone();
        graph.add_compute_pass(
            |p| {
                p.set_name("cull").set_pipeline(sig.clone()).readwrite_buffer("args", args);
            },
            |_| {},
        );
        graph.add_render_pass(
            |p| {
                p.set_name("draw").use_indirect_buffer(args);
            },
            |_| {},
        );
        graph.execute(None);
    }

    // frame 2's slot wait retires frame 1, so one backing serves both frames
    assert_eq!(device.created_buffers(), 1);

    let log = device.barrier_log();
    assert_eq!(log.len(), 4);
    // frame 1: cull initializes the fresh backing, draw consumes it
    assert_eq!(log[0].1.len(), 1);
    assert_eq!(log[0].1[0].src, ResourceState::UNDEFINED);
    assert_eq!(log[0].1[0].dst, ResourceState::UNORDERED_ACCESS);
    assert_eq!(log[1].1.len(), 1);
    assert_eq!(log[1].1[0].src, ResourceState::UNORDERED_ACCESS);
    assert_eq!(log[1].1[0].dst, ResourceState::INDIRECT_ARGUMENT);
    // frame 2: the pooled backing comes back in the state frame 1 left behind
    assert_eq!(log[2].1[0].src, ResourceState::INDIRECT_ARGUMENT);
    assert_eq!(log[2].1[0].dst, ResourceState::UNORDERED_ACCESS);

    let writes = device.bind_table_writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].len(), 1);
    assert_eq!(writes[0][0].slot, 0);
    assert!(matches!(writes[0][0].entry, BindTableEntry::Buffer(_)));
}

#[test]
fn pooled_reuse_waits_for_the_freeing_frame_to_retire() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 2);

    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);
    assert_eq!(device.created_textures(), 1);

    // frame 1 has not retired, so its backing is not reusable yet
    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);
    assert_eq!(device.created_textures(), 2);

    // the slot wait for frame 3 retires frame 1, whose backing is reused
    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);
    assert_eq!(device.created_textures(), 2);
}

#[test]
fn dynamic_resources_are_reused_same_pipeline_depth() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 2);

    add_write_read(&mut graph, "upload", ResourceTags::DYNAMIC);
    graph.execute(None);
    add_write_read(&mut graph, "upload", ResourceTags::DYNAMIC);
    graph.execute(None);

    // reused even though frame 1 never retired
    assert_eq!(device.created_textures(), 1);
}

#[test]
fn pooled_reuse_starts_in_the_freed_state() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);
    // frame 2's slot wait retires frame 1; the backing comes back in COPY_SRC
    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);

    assert_eq!(device.created_textures(), 1);
    let log = device.barrier_log();
    // frame 2's draw transitions from the state frame 1 left behind
    let frame2_draw = &log[2].0[0];
    assert_eq!(frame2_draw.src, ResourceState::COPY_SRC);
    assert_eq!(frame2_draw.dst, ResourceState::RENDER_TARGET);
}

#[test]
fn disjoint_textures_share_memory_through_aliasing() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "early", ResourceTags::empty());
    add_write_read(&mut graph, "late", ResourceTags::empty());
    graph.execute(None);

    assert_eq!(device.alias_calls(), 1);
    // "late" binds over the donor's memory instead of allocating
    assert_eq!(device.created_textures(), 1);

    graph.destroy();
    assert_eq!(device.alive_textures(), 0);
    assert_eq!(device.alive_views(), 0);
}

#[test]
fn rejected_aliasing_falls_back_to_the_pool() {
    let device = Rc::new(MockDevice::new());
    device.set_reject_aliasing(true);
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "early", ResourceTags::empty());
    add_write_read(&mut graph, "late", ResourceTags::empty());
    graph.execute(None);

    assert_eq!(device.alias_calls(), 1);
    // frame 1 has not retired when "late" resolves, so the pool cannot hand
    // out the donor's backing either
    assert_eq!(device.created_textures(), 2);
}

#[test]
fn aliasing_can_be_disabled() {
    let device = Rc::new(MockDevice::new());
    let mut graph = RenderGraph::new(device.clone(), |opts| {
        opts.frames_in_flight = 1;
        opts.enable_memory_aliasing = false;
    });

    add_write_read(&mut graph, "early", ResourceTags::empty());
    add_write_read(&mut graph, "late", ResourceTags::empty());
    graph.execute(None);

    assert_eq!(device.alias_calls(), 0);
    assert_eq!(device.created_textures(), 2);
}

#[test]
fn overlap_blocks_only_past_the_frame_in_flight_cap() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 2);

    for expected_waits in [0, 0, 1, 2] {
        graph.add_present_pass(
            |p| {
                p.set_name("present");
            },
            |_| {},
        );
        graph.execute(None);
        assert_eq!(device.fence_waits(), expected_waits);
    }
    assert_eq!(device.submits(), vec![1, 2, 3, 4]);
}

#[test]
fn imported_backings_are_never_pooled_or_freed() {
    let device = Rc::new(MockDevice::new());
    let external = device.make_external_texture(passage::TextureDesc {
        width: 1280,
        height: 720,
        format: Format::Bgra8Unorm,
        usage: TextureUsage::RENDER_TARGET,
        ..Default::default()
    });
    let mut graph = new_graph(&device, 1);

    let swapchain = graph.create_texture(|t| {
        t.set_name("swapchain").import(external, ResourceState::PRESENT);
    });
    graph.add_render_pass(
        |p| {
            p.set_name("draw").write(swapchain);
        },
        |_| {},
    );
    graph.add_present_pass(
        |p| {
            p.set_name("present").present(swapchain);
        },
        |_| {},
    );
    graph.execute(None);

    assert_eq!(device.created_textures(), 0);
    assert_eq!(device.destroyed_textures(), 0);
    let log = device.barrier_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0[0].src, ResourceState::PRESENT);
    assert_eq!(log[0].0[0].dst, ResourceState::RENDER_TARGET);
    assert_eq!(log[1].0[0].src, ResourceState::RENDER_TARGET);
    assert_eq!(log[1].0[0].dst, ResourceState::PRESENT);

    graph.destroy();
    // the external texture outlives the graph
    assert_eq!(device.alive_textures(), 1);
}

#[test]
fn collect_garbage_frees_retired_pool_entries() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);
    // an empty frame whose slot wait retires frame 1
    graph.add_present_pass(
        |p| {
            p.set_name("present");
        },
        |_| {},
    );
    graph.execute(None);

    let freed = graph.collect_garbage(
        1,
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
    );
    assert_eq!(freed, 1);
    assert_eq!(device.destroyed_textures(), 1);

    // nothing left matching the filter
    let freed = graph.collect_garbage(
        1,
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
    );
    assert_eq!(freed, 0);
}

#[test]
fn collect_garbage_past_the_latest_retired_frame_still_collects() {
    init_logging();
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.execute(None);

    // frame 1 was submitted but never waited on, so nothing has retired
    assert_eq!(graph.latest_finished_frame(), 0);

    // asking to collect up to frame 1 anyway is logged, not refused
    let freed = graph.collect_garbage(
        1,
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
        ResourceTags::DEFAULT,
        ResourceTags::empty(),
    );
    assert_eq!(freed, 1);
    assert_eq!(device.destroyed_textures(), 1);
}

#[test]
fn blackboard_lookups_last_one_cycle() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let tex = graph.create_texture(|t| {
        t.set_name("hdr").set_usage(TextureUsage::RENDER_TARGET);
    });
    graph.add_render_pass(
        |p| {
            p.set_name("draw").write(tex);
        },
        |_| {},
    );
    graph.blackboard_mut().add_value("exposure", passage::Value::Float(1.5)).unwrap();

    assert_eq!(graph.get_texture("hdr"), Some(tex));
    assert!(graph.get_pass("draw").is_some());
    assert_eq!(graph.blackboard().value("exposure"), Some(passage::Value::Float(1.5)));

    graph.execute(None);

    assert_eq!(graph.get_texture("hdr"), None);
    assert_eq!(graph.get_pass("draw"), None);
    assert_eq!(graph.blackboard().value("exposure"), None);
}

#[test]
fn callbacks_see_resolved_backings_and_the_frame_index() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let ran = Rc::new(Cell::new(0u32));
    let tex = graph.create_texture(|t| {
        t.set_name("color").set_usage(TextureUsage::RENDER_TARGET);
    });
    {
        let ran = ran.clone();
        graph.add_render_pass(
            |p| {
                p.set_name("draw").write(tex);
            },
            move |ctx| {
                // resolving panics if the backing were missing
                let _ = ctx.texture(tex);
                assert_eq!(ctx.frame(), 1);
                ran.set(ran.get() + 1);
            },
        );
    }
    let frame = graph.execute(None);
    assert_eq!(frame, 1);
    assert_eq!(graph.frame_index(), 1);
    assert_eq!(ran.get(), 1);
}

#[derive(Default)]
struct CountingProfiler {
    begins: Vec<String>,
    ends: usize,
}

impl Profiler for CountingProfiler {
    fn begin_pass(&mut self, _frame: u64, name: &str) {
        self.begins.push(name.to_string());
    }

    fn end_pass(&mut self) {
        self.ends += 1;
    }
}

#[test]
fn profiler_brackets_every_live_pass() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    add_write_read(&mut graph, "target", ResourceTags::empty());
    graph.add_compute_pass(
        |p| {
            p.set_name("orphan");
        },
        |_| {},
    );

    let mut profiler = CountingProfiler::default();
    graph.execute(Some(&mut profiler));

    assert_eq!(profiler.begins, vec!["target.draw", "target.readback"]);
    assert_eq!(profiler.ends, 2);
}

#[test]
fn bind_tables_are_recycled_across_frames() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);

    let signature = Rc::new(PipelineSignature {
        name: "blit".to_string(),
        slots: vec![BindingSlot {
            name: "src".to_string(),
            kind: BindingKind::SampledTexture,
            slot: 0,
        }],
    });

    for _ in 0..3 {
        let tex = graph.create_texture(|t| {
            t.set_name("color")
                .set_usage(TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED);
        });
        graph.add_render_pass(
            |p| {
                p.set_name("draw").write(tex);
            },
            |_| {},
        );
        let sig = signature.clone();
        graph.add_render_pass(
            |p| {
                p.set_name("blit").set_pipeline(sig.clone()).read("src", tex);
            },
            |_| {},
        );
        graph.execute(None);
    }

    // one table serves the signature for the executor's whole lifetime
    assert_eq!(device.created_bind_tables(), 1);
    assert_eq!(device.bind_table_writes().len(), 3);
}

#[test]
#[should_panic(expected = "device lost")]
fn device_loss_is_fatal() {
    let device = Rc::new(MockDevice::new());
    let mut graph = new_graph(&device, 1);
    graph.add_present_pass(
        |p| {
            p.set_name("present");
        },
        |_| {},
    );
    device.lose();
    graph.execute(None);
}
