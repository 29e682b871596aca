use std::sync::Arc;

use super::dir::DirNode;
use super::error::FsResult;
use super::Context;

/// Entry point of the tree. Holds nothing but the shared context.
#[derive(Debug, Clone)]
pub struct CbfsRoot {
    ctx: Arc<Context>,
}

impl CbfsRoot {
    pub fn new(ctx: Context) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn root(&self) -> FsResult<Arc<DirNode>> {
        DirNode::fetch(&self.ctx, "/").map(Arc::new)
    }
}
