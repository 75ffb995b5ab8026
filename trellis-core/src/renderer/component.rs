//! Components
//!
//! A component definition bundles a render function with optional setup,
//! reactive `data` and lifecycle hooks. Mounting a component node creates a
//! [`ComponentInstance`] whose render runs inside an effect: when anything the
//! render read changes, the effect queues the instance's update job on the
//! batch scheduler instead of re-rendering inline.
//!
//! # Lifecycle
//!
//! 1. `setup` (if any) runs untracked. It may register hooks and may return
//!    the render function; otherwise the definition's `render` is used.
//! 2. `data` (if any) runs untracked and its result is wrapped.
//! 3. `created` runs.
//! 4. The render effect runs for the first time: `before_mount` hooks, render,
//!    mount of the subtree, `mounted` hooks.
//! 5. Each update job re-renders (with pending props applied) and patches
//!    the previous subtree into the new one.
//! 6. Unmounting stops the effect and unmounts the subtree.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, error};

use super::RendererInner;
use crate::error::{Error, RenderError, Result};
use crate::host::{HostAdapter, NodeHandle};
use crate::reactive::{Effect, EffectOptions, Prop, Reactive, Runtime};
use crate::scheduler::{Job, JobId};
use crate::vnode::{PropValue, Props, VNode};

/// Produces a component's subtree.
pub type RenderFn = Rc<dyn Fn(&ComponentContext<'_>) -> VNode>;

/// Runs once per instance before the first render. May return the render
/// function.
pub type SetupFn = Rc<dyn Fn(&mut SetupContext<'_>) -> Option<RenderFn>>;

/// A lifecycle hook.
pub type HookFn = Rc<dyn Fn(&ComponentContext<'_>)>;

/// Wrap a closure as a [`RenderFn`].
pub fn render_fn<F>(f: F) -> RenderFn
where
    F: Fn(&ComponentContext<'_>) -> VNode + 'static,
{
    Rc::new(f)
}

/// A component definition.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use serde_json::json;
/// use trellis_core::renderer::ComponentDef;
/// use trellis_core::vnode::VNode;
///
/// let counter = Rc::new(
///     ComponentDef::new("Counter")
///         .data(|| json!({ "count": 0 }))
///         .render(|ctx| {
///             let count = ctx
///                 .data()
///                 .and_then(|d| d.get("count"))
///                 .and_then(|c| c.as_i64())
///                 .unwrap_or(0);
///             VNode::element("span").children(count.to_string())
///         }),
/// );
/// assert_eq!(counter.name(), "Counter");
/// ```
#[derive(Clone)]
pub struct ComponentDef {
    name: String,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    data: Option<Rc<dyn Fn() -> Value>>,
    created: Option<HookFn>,
    before_mount: Option<HookFn>,
    mounted: Option<HookFn>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            render: None,
            data: None,
            created: None,
            before_mount: None,
            mounted: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SetupContext<'_>) -> Option<RenderFn> + 'static,
    {
        self.setup = Some(Rc::new(f));
        self
    }

    pub fn render<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) -> VNode + 'static,
    {
        self.render = Some(Rc::new(f));
        self
    }

    /// Initial state. Objects and arrays become the instance's reactive
    /// `data`; primitives are ignored.
    pub fn data<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.data = Some(Rc::new(f));
        self
    }

    pub fn created<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) + 'static,
    {
        self.created = Some(Rc::new(f));
        self
    }

    pub fn before_mount<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) + 'static,
    {
        self.before_mount = Some(Rc::new(f));
        self
    }

    pub fn mounted<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) + 'static,
    {
        self.mounted = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("render", &self.render.is_some())
            .field("data", &self.data.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Hooks {
    before_mount: Vec<HookFn>,
    mounted: Vec<HookFn>,
}

/// Passed to `setup`.
pub struct SetupContext<'a> {
    runtime: &'a Runtime,
    props: &'a Props,
    hooks: &'a mut Hooks,
}

impl SetupContext<'_> {
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    pub fn props(&self) -> &Props {
        self.props
    }

    pub fn on_before_mount<F>(&mut self, f: F)
    where
        F: Fn(&ComponentContext<'_>) + 'static,
    {
        self.hooks.before_mount.push(Rc::new(f));
    }

    pub fn on_mounted<F>(&mut self, f: F)
    where
        F: Fn(&ComponentContext<'_>) + 'static,
    {
        self.hooks.mounted.push(Rc::new(f));
    }
}

/// Passed to render functions and lifecycle hooks.
pub struct ComponentContext<'a> {
    instance: &'a ComponentInstance,
}

impl ComponentContext<'_> {
    pub fn runtime(&self) -> &Runtime {
        &self.instance.runtime
    }

    pub fn uid(&self) -> u64 {
        self.instance.uid
    }

    pub fn props(&self) -> Props {
        self.instance.props.borrow().clone()
    }

    pub fn prop(&self, name: &str) -> Option<PropValue> {
        self.instance.props.borrow().get(name).cloned()
    }

    pub fn data(&self) -> Option<&Reactive> {
        self.instance.data.as_ref()
    }
}

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    def: Rc<ComponentDef>,
    runtime: Runtime,
    props: RefCell<Props>,
    next_props: RefCell<Option<Props>>,
    data: Option<Reactive>,
    render: RenderFn,
    hooks: Hooks,
    effect: RefCell<Option<Effect>>,
    pub(crate) sub_tree: RefCell<Option<VNode>>,
    is_mounted: Cell<bool>,
    pub(crate) container: Cell<Option<NodeHandle>>,
    pub(crate) anchor: Cell<Option<NodeHandle>>,
    job: JobId,
    failure: RefCell<Option<Error>>,
}

impl ComponentInstance {
    fn create(runtime: &Runtime, def: Rc<ComponentDef>, props: Props) -> Result<Rc<Self>> {
        static UID: AtomicU64 = AtomicU64::new(0);

        let mut hooks = Hooks::default();
        let from_setup = match &def.setup {
            Some(setup) => runtime.untracked(|| {
                let mut ctx = SetupContext {
                    runtime,
                    props: &props,
                    hooks: &mut hooks,
                };
                setup(&mut ctx)
            }),
            None => None,
        };
        let render = from_setup
            .or_else(|| def.render.clone())
            .ok_or_else(|| RenderError::MissingRender(def.name.clone()))?;

        let data = def.data.as_ref().and_then(|data| {
            match runtime.to_reactive(runtime.untracked(|| data())) {
                Prop::Reactive(reactive) => Some(reactive),
                Prop::Value(_) => None,
            }
        });

        hooks.before_mount.extend(def.before_mount.clone());
        hooks.mounted.extend(def.mounted.clone());

        let instance = Rc::new(Self {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            def,
            runtime: runtime.clone(),
            props: RefCell::new(props),
            next_props: RefCell::new(None),
            data,
            render,
            hooks,
            effect: RefCell::new(None),
            sub_tree: RefCell::new(None),
            is_mounted: Cell::new(false),
            container: Cell::new(None),
            anchor: Cell::new(None),
            job: JobId::new(),
            failure: RefCell::new(None),
        });

        if let Some(created) = &instance.def.created {
            runtime.untracked(|| created(&instance.context()));
        }
        Ok(instance)
    }

    fn context(&self) -> ComponentContext<'_> {
        ComponentContext { instance: self }
    }

    fn call_hooks(&self, hooks: &[HookFn]) {
        let ctx = self.context();
        self.runtime.untracked(|| {
            for hook in hooks {
                hook(&ctx);
            }
        });
    }

    fn render_tree(&self) -> VNode {
        (self.render)(&self.context())
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn data(&self) -> Option<&Reactive> {
        self.data.as_ref()
    }

    pub fn props(&self) -> Props {
        self.props.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.get()
    }

    /// Number of completed renders.
    pub fn render_count(&self) -> u64 {
        self.effect
            .borrow()
            .as_ref()
            .map_or(0, Effect::run_count)
    }

    /// Id of the update job this instance queues.
    pub fn job_id(&self) -> JobId {
        self.job
    }

    fn effect(&self) -> Option<Effect> {
        self.effect.borrow().clone()
    }

    /// Record new props and queue a re-render.
    pub(crate) fn receive_props(self: &Rc<Self>, props: Props) {
        if *self.props.borrow() == props {
            return;
        }
        *self.next_props.borrow_mut() = Some(props);
        self.queue_update();
    }

    pub(crate) fn queue_update(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.runtime.enqueue(Job::new(self.job, move || {
            let Some(instance) = weak.upgrade() else {
                return Ok(());
            };
            if let Some(effect) = instance.effect() {
                effect.run();
            }
            instance.take_failure()
        }));
    }

    fn take_failure(&self) -> Result<()> {
        match self.failure.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stop the render effect.
    pub(crate) fn stop(&self) {
        if let Some(effect) = self.effect.borrow_mut().take() {
            let _ = effect.stop();
        }
        self.is_mounted.set(false);
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.def.name)
            .field("mounted", &self.is_mounted.get())
            .finish()
    }
}

impl<H: HostAdapter + 'static> RendererInner<H> {
    pub(crate) fn mount_component(
        &self,
        vnode: &mut VNode,
        def: Rc<ComponentDef>,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let instance = ComponentInstance::create(&self.runtime, def, vnode.props.clone())?;
        instance.container.set(Some(container));
        instance.anchor.set(anchor);
        vnode.component = Some(Rc::clone(&instance));
        debug!(uid = instance.uid, name = %instance.def.name, "mounting component");

        let body = {
            let renderer: Weak<RendererInner<H>> = self.this.clone();
            let instance = Rc::downgrade(&instance);
            move || {
                let Some(instance) = instance.upgrade() else {
                    return;
                };
                let result = match renderer.upgrade() {
                    Some(renderer) => renderer.update_component(&instance),
                    None => Err(RenderError::RendererDropped.into()),
                };
                if let Err(err) = result {
                    error!(uid = instance.uid, name = %instance.def.name, %err, "component render failed");
                    *instance.failure.borrow_mut() = Some(err);
                }
            }
        };
        let scheduler = {
            let instance = Rc::downgrade(&instance);
            Rc::new(move |_: &Effect| {
                if let Some(instance) = instance.upgrade() {
                    instance.queue_update();
                }
            })
        };

        let effect = Effect::with_options(
            &self.runtime,
            body,
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
            },
        );
        *instance.effect.borrow_mut() = Some(effect.clone());
        effect.run();
        instance.take_failure()
    }

    pub(crate) fn patch_component(&self, old: &mut VNode, new: &mut VNode, container: NodeHandle) -> Result<()> {
        let instance = old
            .component
            .take()
            .ok_or(RenderError::MissingHandle("component"))?;
        instance.container.set(Some(container));
        instance.receive_props(new.props.clone());
        new.component = Some(instance);
        Ok(())
    }

    fn update_component(&self, instance: &Rc<ComponentInstance>) -> Result<()> {
        let container = instance
            .container
            .get()
            .ok_or(RenderError::MissingHandle("component container"))?;

        if !instance.is_mounted.get() {
            instance.call_hooks(&instance.hooks.before_mount);
            let mut tree = instance.render_tree();
            self.patch(None, &mut tree, container, instance.anchor.get())?;
            *instance.sub_tree.borrow_mut() = Some(tree);
            instance.is_mounted.set(true);
            instance.call_hooks(&instance.hooks.mounted);
            return Ok(());
        }

        if let Some(props) = instance.next_props.borrow_mut().take() {
            *instance.props.borrow_mut() = props;
        }
        let mut next = instance.render_tree();
        let mut prev = instance.sub_tree.borrow_mut().take();

        let anchor = prev
            .as_ref()
            .and_then(|prev| self.last_host(prev))
            .map(|last| self.host.borrow().next_sibling(last))
            .unwrap_or_else(|| instance.anchor.get());

        debug!(uid = instance.uid, name = %instance.def.name, "updating component");
        let result = self.patch(prev.as_mut(), &mut next, container, anchor);
        *instance.sub_tree.borrow_mut() = Some(next);
        result
    }
}
