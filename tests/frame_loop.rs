//! End-to-end frame-loop tests over an assembled [`World`]: entities,
//! components and families feeding schedules whose declared accesses the
//! executor must respect across frames.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orrery::prelude::*;

define_component!(struct Heat(i32));
define_component!(struct Coolant(i32));
define_tag_component!(Overheated);

/// Watches how many closures tagged with the same resource are in flight.
#[derive(Default)]
struct ConcurrencyProbe {
    current: AtomicI32,
    peak: AtomicI32,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }
    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn families_drive_schedules_across_frames() {
    let world = Arc::new(World::new());
    let hot = world.family(
        FamilyDefinition::new().with_all::<Heat>().with_any::<Overheated>(),
    );

    let reactor = world.create_entity();
    world.set(reactor, Heat(900)).unwrap();
    world.set(reactor, Overheated).unwrap();
    let idle = world.create_entity();
    world.set(idle, Heat(20)).unwrap();

    assert!(hot.contains(reactor));
    assert!(!hot.contains(idle));

    // One frame of "cooling": the schedule reads the hot family and clears
    // the overheated marker on every member.
    let cooled = Arc::new(AtomicUsize::new(0));
    let descriptor = {
        let world_handle = world.clone();
        let hot_handle = hot.clone();
        let cooled_handle = cooled.clone();
        world.schedule("cooling", 0, move || {
            for id in hot_handle.ids() {
                let entity = world_handle.entities().get(id).unwrap();
                world_handle.remove_component::<Overheated>(entity);
                cooled_handle.fetch_add(1, Ordering::SeqCst);
            }
        })
    };
    descriptor.declare_family_read(&hot);
    descriptor.declare_write_index(Overheated::index());

    world.update(Duration::from_millis(16));

    assert_eq!(cooled.load(Ordering::SeqCst), 1);
    assert!(!hot.contains(reactor));
    assert!(!world.has::<Overheated>(reactor));
    // Both declarations above were recorded as descriptor mutations.
    assert!(descriptor.version() >= 2);
}

#[test]
fn conflicting_schedules_serialize_across_many_frames() {
    let world = Arc::new(World::with_config(ExecutorConfig { worker_budget: 4 }));

    let writer = world.dispatcher().declare("heat-writer", 0);
    writer.declare_write::<Heat>();
    let reader = world.dispatcher().declare("heat-reader", 0);
    reader.declare_read::<Heat>();
    let bystander = world.dispatcher().declare("coolant-only", 0);
    bystander.declare_write::<Coolant>();

    let probe = Arc::new(ConcurrencyProbe::default());
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..25 {
        for descriptor in [&writer, &reader] {
            let probe = probe.clone();
            let runs = runs.clone();
            world.dispatcher().enqueue(descriptor, move || {
                probe.enter();
                std::thread::sleep(Duration::from_micros(300));
                runs.fetch_add(1, Ordering::SeqCst);
                probe.exit();
            });
        }
        {
            let runs = runs.clone();
            world.dispatcher().enqueue(&bystander, move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        world.update(Duration::from_millis(16));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 75);
    // Heat-conflicting bodies were never observed overlapping.
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn explicit_ordering_holds_within_a_frame() {
    let world = Arc::new(World::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let produce = world.dispatcher().declare("produce", 0);
    let consume = world.dispatcher().declare("consume", 0);
    consume.depends_on_name("produce");

    for frame in 0..5 {
        for (descriptor, label) in [(&produce, "produce"), (&consume, "consume")] {
            let order = order.clone();
            world
                .dispatcher()
                .enqueue(descriptor, move || order.lock().unwrap().push(label));
        }
        world.update(Duration::from_millis(16));

        let observed = order.lock().unwrap();
        assert_eq!(observed.len(), (frame + 1) * 2);
        // Within every frame the producer came first.
        assert_eq!(observed[frame * 2], "produce");
        assert_eq!(observed[frame * 2 + 1], "consume");
    }
}

#[test]
fn delayed_work_joins_a_later_frame() {
    let world = Arc::new(World::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let descriptor = world.dispatcher().declare("fuse", 0);
    {
        let fired = fired.clone();
        world
            .dispatcher()
            .run_delayed(Duration::from_millis(50), &descriptor, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
    }

    for _ in 0..3 {
        world.update(Duration::from_millis(16));
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    world.update(Duration::from_millis(16));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn a_failing_schedule_does_not_poison_the_frame() {
    let world = Arc::new(World::new());
    let survivor_ran = Arc::new(AtomicUsize::new(0));

    let failing = world.dispatcher().declare("failing", 0);
    let survivor = world.dispatcher().declare("survivor", 0);
    survivor.depends_on(failing.schedule());

    world
        .dispatcher()
        .enqueue(&failing, || panic!("deliberate failure"));
    {
        let survivor_ran = survivor_ran.clone();
        world.dispatcher().enqueue(&survivor, move || {
            survivor_ran.fetch_add(1, Ordering::SeqCst);
        });
    }
    world.update(Duration::from_millis(16));

    assert_eq!(survivor_ran.load(Ordering::SeqCst), 1);
    // The world remains usable afterwards.
    let entity = world.create_entity();
    world.set(entity, Heat(1)).unwrap();
    assert_eq!(world.get::<Heat>(entity).unwrap(), Heat(1));
}
