//! A test-runner for flushing out data-races and race-conditions.

use std::{
    cell::RefCell,
    sync::{Arc, atomic::{AtomicIsize, Ordering}},
    thread::{self, JoinHandle},
};

/// Bursty runs user-specified steps _in lock-step_ across multiple threads.
///
/// Bursty allows the user to:
///
/// -   Register a Global state, shared across all threads; typically the pool under test.
/// -   Register N instances of a Local state, each dedicated to a single thread; typically the partitions it holds.
/// -   Register S steps, which will run on each thread, in lock-step with other threads.
///
/// Each step starts as simultaneously as possible on all threads, maximizing contention on the Global state, and no
/// thread starts step `S + 1` before all threads completed step `S`.
///
/// Constructing a `Bursty` is done through a `BurstyBuilder`.
pub struct Bursty<Global, Local> {
    global: Arc<Global>,
    threads: RefCell<Vec<JoinHandle<Local>>>,
    results: RefCell<Vec<Local>>,
}

impl<Global, Local> Bursty<Global, Local> {
    /// Joins the threads, and collects their Local states.
    ///
    /// #   Panics
    ///
    /// -   If any of the threads being joined panicked.
    pub fn join(&self) {
        let threads = self.threads.replace(vec!());

        if threads.is_empty() {
            return;
        }

        //  Join all threads before checking for panics, so no thread is left behind.
        let outcomes: Vec<_> = threads.into_iter().map(|handle| handle.join()).collect();

        let results = outcomes.into_iter()
            .map(|outcome| outcome.expect("Thread completed"))
            .collect();

        self.results.replace(results);
    }

    /// Returns a reference to the Global state.
    ///
    /// #   Warning
    ///
    /// Access is provided _without_ joining the threads first.
    pub fn global(&self) -> &Global { &self.global }

    /// Joins the threads, then returns a clone of their Local states.
    pub fn locals(&self) -> Vec<Local>
        where
            Local: Clone,
    {
        self.join();

        self.results.borrow().clone()
    }
}

impl<Global, Local> Drop for Bursty<Global, Local> {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.join();
        }
    }
}

/// BurstyBuilder, a builder for a `Bursty` instance.
///
/// #   Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use segpool_test::BurstyBuilder;
///
/// let mut builder = BurstyBuilder::new(AtomicUsize::new(0), vec!(1, 10));
///
/// builder.add_simple_step(|| |global: &AtomicUsize, local: &mut usize| { global.fetch_add(*local, Ordering::Relaxed); });
///
/// let bursty = builder.launch(4);
/// bursty.join();
///
/// assert_eq!(44, bursty.global().load(Ordering::Relaxed));
/// assert_eq!(vec!(1, 10), bursty.locals());
/// ```
pub struct BurstyBuilder<Global, Local> {
    global: Arc<Global>,
    locals: Vec<Local>,
    steps: Vec<Vec<Step<Global, Local>>>,
    rendez_vous: Vec<RendezVous>,
}

type Step<Global, Local> = Box<dyn FnMut(&Global, &mut Local) + Send + 'static>;

impl<Global, Local> BurstyBuilder<Global, Local>
    where
        Global: Send + Sync + 'static,
        Local: Send + 'static,
{
    /// Creates a new instance, with one thread per Local state.
    pub fn new(global: Global, locals: Vec<Local>) -> Self {
        assert!(!locals.is_empty(), "Cannot burst without a single thread");

        let global = Arc::new(global);
        let steps = locals.iter().map(|_| vec!()).collect();
        let rendez_vous = vec!(RendezVous::new(locals.len()));

        Self { global, locals, steps, rendez_vous, }
    }

    /// Adds a step on each thread.
    ///
    /// The step is created by invoking `factory` for each thread.
    pub fn add_simple_step<Factory, S>(&mut self, mut factory: Factory)
        where
            Factory: FnMut() -> S,
            S: FnMut(&Global, &mut Local) + Send + 'static,
    {
        self.add_complex_step(move || {
            let mut step = factory();
            (|_: &Global, _: &mut Local| (), move |global: &Global, local: &mut Local, _: ()| step(global, local))
        });
    }

    /// Adds a step to each thread, split in two parts, both created by invoking `factory` for each thread:
    ///
    /// -   A preparatory part, run _before_ waiting for the other threads, ideal for expensive preparatory work.
    /// -   The actual step, run in lock-step, which receives the result of the preparatory part.
    pub fn add_complex_step<Factory, Prep, R, S>(&mut self, mut factory: Factory)
        where
            Factory: FnMut() -> (Prep, S),
            Prep: FnMut(&Global, &mut Local) -> R + Send + 'static,
            S: FnMut(&Global, &mut Local, R) + Send + 'static,
    {
        let rendez_vous = RendezVous::new(self.locals.len());
        let previous = self.rendez_vous.last().cloned().expect("At least one RendezVous");

        for serie in &mut self.steps {
            let (mut prep, mut step) = factory();
            let rendez_vous = rendez_vous.clone();
            let previous = previous.clone();

            serie.push(Box::new(move |global: &Global, local: &mut Local| {
                let prepared = prep(global, local);

                rendez_vous.wait_until_all_ready();

                step(global, local, prepared);

                //  All threads are past `previous`, since they all reached `rendez_vous`: it can be rearmed.
                previous.reset();
            }));
        }

        self.rendez_vous.push(rendez_vous);
    }

    /// Creates the Bursty instance, which will run each serie of steps `iterations` times.
    ///
    /// The threads start immediately.
    pub fn launch(mut self, iterations: usize) -> Bursty<Global, Local> {
        assert!(!self.steps[0].is_empty(), "Cannot burst without a single step");

        let first = self.rendez_vous.first().cloned().expect("At least one RendezVous");
        let last = self.rendez_vous.last().cloned().expect("At least one RendezVous");

        for serie in &mut self.steps {
            let first = first.clone();
            let last = last.clone();

            serie.push(Box::new(move |_: &Global, _: &mut Local| {
                first.wait_until_all_ready();

                last.reset();
            }));
        }

        let rendez_vous = Arc::new(self.rendez_vous);

        let threads = self.locals.into_iter()
            .zip(self.steps)
            .map(|(mut local, mut serie)| {
                let global = self.global.clone();
                let rendez_vous = rendez_vous.clone();

                thread::spawn(move || {
                    let mut guard = PoisonGuard(rendez_vous);

                    for _ in 0..iterations {
                        for step in &mut serie {
                            step(&global, &mut local);
                        }
                    }

                    guard.dismiss();

                    local
                })
            })
            .collect();

        Bursty { global: self.global, threads: RefCell::new(threads), results: RefCell::new(vec!()) }
    }
}

//
//  Implementation details
//

//  If a single thread panics, all others must stop waiting for it.
struct PoisonGuard(Arc<Vec<RendezVous>>);

impl PoisonGuard {
    fn dismiss(&mut self) { self.0 = Arc::default() }
}

impl Drop for PoisonGuard {
    fn drop(&mut self) {
        for rendez_vous in self.0.iter() {
            rendez_vous.poison();
        }
    }
}

#[derive(Clone, Debug)]
struct RendezVous(Arc<(AtomicIsize, isize)>);

impl RendezVous {
    fn new(count: usize) -> Self {
        let count = isize::try_from(count).expect("Reasonable number of threads");

        Self(Arc::new((AtomicIsize::new(count), count)))
    }

    fn poison(&self) { self.0.0.store(-1, Ordering::Relaxed); }

    fn wait_until_all_ready(&self) {
        self.0.0.fetch_sub(1, Ordering::AcqRel);

        while self.remaining() != 0 {
            std::hint::spin_loop();
        }
    }

    fn reset(&self) {
        //  Only the first thread to reset actually rearms, others find it rearmed already.
        let _ = self.0.0.compare_exchange(0, self.0.1, Ordering::AcqRel, Ordering::Relaxed);
    }

    fn remaining(&self) -> isize {
        let count = self.0.0.load(Ordering::Acquire);

        if count < 0 {
            abandon_ship();
        }

        count
    }
}

#[cold]
#[inline(never)]
fn abandon_ship() -> ! {
    panic!("Another thread panicked, abandoning ship!");
}

// mod tests
