//! Wrappers around the dispatch [`Pipeline`](crate::pipeline::Pipeline).
//!
//! [`AppBuilder::with_decorator`](crate::AppBuilder::with_decorator) stacks decorators with a
//! [`DecoratorComposer`]; [`TrailingSlashDecorator`](crate::pipeline::TrailingSlashDecorator)
//! is applied last, outside all of them.

/// Turns a value, usually a pipeline, into a wrapped one.
pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}

/// `inner` applied first, `outer` around its result.
#[derive(Debug, Clone, Copy)]
pub struct DecoratorComposer<D1, D2> {
    inner: D1,
    outer: D2,
}

impl<D1, D2> DecoratorComposer<D1, D2> {
    pub fn new(inner: D1, outer: D2) -> Self {
        Self { inner, outer }
    }
}

impl<In, D1, D2> Decorator<In> for DecoratorComposer<D1, D2>
where
    D1: Decorator<In>,
    D2: Decorator<D1::Out>,
{
    type Out = D2::Out;

    fn decorate(&self, raw: In) -> Self::Out {
        self.outer.decorate(self.inner.decorate(raw))
    }
}

/// The decorator of an [`AppBuilder`](crate::AppBuilder) before any is added.
#[derive(Default, Clone, Copy, Debug)]
pub struct IdentityDecorator;

impl<In> Decorator<In> for IdentityDecorator {
    type Out = In;

    #[inline]
    fn decorate(&self, raw: In) -> Self::Out {
        raw
    }
}
