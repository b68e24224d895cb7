use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

// 跨平台比对视图：移动端调试页对同一批字面量坐标
// 核对 cell_id、canonical_key 与邻格顺序
#[derive(Debug, Serialize)]
pub struct CellResponse {
    pub cell_id: String,
    pub canonical_key: String,
    /// 固定顺序 N, NE, E, SE, S, SW, W, NW
    pub neighbors: [String; 8],
    pub resolution: f64,
}
