use std::collections::HashSet;

use crate::error::AppError;

/// 固定精度的经纬度网格索引。
///
/// cell_id 是 (lat, lng, resolution) 的纯函数，必须与移动端实现
/// 逐字节一致，客户端的调试页面会用同一批字面量向量做比对。
#[derive(Debug, Clone, Copy)]
pub struct CellGrid {
    resolution: f64,
    /// 每度格数的倒数，即 1 / resolution
    scale: f64,
    /// 经度方向一圈的格数，用于 ±180° 回绕
    lng_cells: i64,
    max_lat_idx: i64,
    /// canonical key 的小数位数，由精度推出
    precision: usize,
}

// 八个相邻格的固定顺序：N, NE, E, SE, S, SW, W, NW
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

impl Default for CellGrid {
    fn default() -> Self {
        CellGrid::new(0.01)
    }
}

impl CellGrid {
    pub fn new(resolution: f64) -> Self {
        let scale = 1.0 / resolution;
        let precision = (-resolution.log10()).ceil().max(0.0) as usize;
        CellGrid {
            resolution,
            scale,
            lng_cells: (360.0 * scale).round() as i64,
            max_lat_idx: (90.0 * scale).round() as i64 - 1,
            precision,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    fn validate(latitude: f64, longitude: f64) -> Result<(), AppError> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lng_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(AppError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    // 纬度取 floor 后夹在两极，经度在 ±180° 回绕
    fn indices(&self, latitude: f64, longitude: f64) -> Result<(i64, i64), AppError> {
        Self::validate(latitude, longitude)?;

        let lat_idx = self.clamp_lat((latitude * self.scale).floor() as i64);

        let lng_idx = (longitude * self.scale).floor() as i64;
        let lng_idx = self.wrap_lng(lng_idx);

        Ok((lat_idx, lng_idx))
    }

    fn wrap_lng(&self, lng_idx: i64) -> i64 {
        let half = self.lng_cells / 2;
        (lng_idx + half).rem_euclid(self.lng_cells) - half
    }

    fn clamp_lat(&self, lat_idx: i64) -> i64 {
        lat_idx.clamp(-self.max_lat_idx - 1, self.max_lat_idx)
    }

    fn id_from(&self, lat_idx: i64, lng_idx: i64) -> String {
        format!("{}:{}", lat_idx, lng_idx)
    }

    /// 点所在格的唯一标识，例如 (4.7410, -74.0721) -> "474:-7408"
    pub fn cell_id(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        let (lat_idx, lng_idx) = self.indices(latitude, longitude)?;
        Ok(self.id_from(lat_idx, lng_idx))
    }

    /// 可读、可排序的调试形式：截断到网格精度的经纬度对
    pub fn canonical_key(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        let (lat_idx, lng_idx) = self.indices(latitude, longitude)?;
        Ok(format!(
            "{:.prec$},{:.prec$}",
            lat_idx as f64 * self.resolution,
            lng_idx as f64 * self.resolution,
            prec = self.precision,
        ))
    }

    /// 八个相邻格，固定顺序 N, NE, E, SE, S, SW, W, NW。
    /// 经度回绕，纬度在两极夹紧（此时部分相邻格会重合）。
    pub fn neighbor_cells(&self, latitude: f64, longitude: f64) -> Result<[String; 8], AppError> {
        let (lat_idx, lng_idx) = self.indices(latitude, longitude)?;
        Ok(NEIGHBOR_OFFSETS.map(|(dlat, dlng)| {
            self.id_from(
                self.clamp_lat(lat_idx + dlat),
                self.wrap_lng(lng_idx + dlng),
            )
        }))
    }

    /// 所在格加八邻格的去重集合，服务层按它做分区查询
    pub fn cell_with_neighbors(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<HashSet<String>, AppError> {
        let mut cells: HashSet<String> = self
            .neighbor_cells(latitude, longitude)?
            .into_iter()
            .collect();
        cells.insert(self.cell_id(latitude, longitude)?);
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 与移动端共享的字面量向量，两边结果必须逐字节一致
    #[test]
    fn cross_platform_vectors() {
        let grid = CellGrid::default();
        let cases = [
            (4.7410, -74.0721, "474:-7408", "4.74,-74.08"),
            (0.5, 0.5, "50:50", "0.50,0.50"),
            (-34.6037, -58.3816, "-3461:-5839", "-34.61,-58.39"),
            (40.4168, -3.7038, "4041:-371", "40.41,-3.71"),
            (19.4326, -99.1332, "1943:-9914", "19.43,-99.14"),
        ];
        for (lat, lng, cell, key) in cases {
            assert_eq!(grid.cell_id(lat, lng).unwrap(), cell);
            assert_eq!(grid.canonical_key(lat, lng).unwrap(), key);
        }
    }

    #[test]
    fn determinism() {
        let grid = CellGrid::default();
        assert_eq!(
            grid.cell_id(4.7410, -74.0721).unwrap(),
            grid.cell_id(4.7410, -74.0721).unwrap()
        );
        assert_eq!(
            grid.neighbor_cells(0.5, 0.5).unwrap(),
            grid.neighbor_cells(0.5, 0.5).unwrap()
        );
    }

    #[test]
    fn neighbor_order_is_fixed() {
        let grid = CellGrid::default();
        let neighbors = grid.neighbor_cells(0.5, 0.5).unwrap();
        // 中心格 50:50，顺序 N, NE, E, SE, S, SW, W, NW
        assert_eq!(
            neighbors,
            [
                "51:50", "51:51", "50:51", "49:51", "49:50", "49:49", "50:49", "51:49"
            ]
        );
    }

    #[test]
    fn neighbor_symmetry() {
        let grid = CellGrid::default();
        let center = grid.cell_id(4.7410, -74.0721).unwrap();
        let neighbors = grid.neighbor_cells(4.7410, -74.0721).unwrap();
        // N 邻格的 S 邻格应当回到中心格（索引 0 <-> 4，1 <-> 5 ...）
        let north = &neighbors[0];
        let (lat_idx, lng_idx) = {
            let mut parts = north.split(':');
            (
                parts.next().unwrap().parse::<i64>().unwrap(),
                parts.next().unwrap().parse::<i64>().unwrap(),
            )
        };
        let north_lat = (lat_idx as f64 + 0.5) * grid.resolution();
        let north_lng = (lng_idx as f64 + 0.5) * grid.resolution();
        let back = grid.neighbor_cells(north_lat, north_lng).unwrap();
        assert_eq!(back[4], center);
    }

    #[test]
    fn longitude_wraps_at_antimeridian() {
        let grid = CellGrid::default();
        // 180° 与 -180° 是同一格
        assert_eq!(
            grid.cell_id(0.5, 180.0).unwrap(),
            grid.cell_id(0.5, -180.0).unwrap()
        );
        // 最东一格的东邻格回绕到最西一格
        let neighbors = grid.neighbor_cells(0.5, 179.995).unwrap();
        assert_eq!(neighbors[2], "50:-18000");
    }

    #[test]
    fn latitude_clamps_at_poles() {
        let grid = CellGrid::default();
        // 90° 归入最顶行，不回绕
        assert_eq!(grid.cell_id(90.0, 0.0).unwrap(), "8999:0");
        let neighbors = grid.neighbor_cells(90.0, 0.0).unwrap();
        // 顶行的北邻格夹回顶行本身
        assert_eq!(neighbors[0], "8999:0");
        assert_eq!(grid.cell_id(-90.0, 0.0).unwrap(), "-9000:0");
    }

    #[test]
    fn invalid_coordinates_rejected() {
        let grid = CellGrid::default();
        assert!(grid.cell_id(90.1, 0.0).is_err());
        assert!(grid.cell_id(0.0, -180.1).is_err());
        assert!(grid.cell_id(f64::NAN, 0.0).is_err());
        assert!(grid.canonical_key(0.0, f64::INFINITY).is_err());
        assert!(grid.neighbor_cells(-91.0, 0.0).is_err());
    }

    #[test]
    fn nine_cell_set_contains_center() {
        let grid = CellGrid::default();
        let cells = grid.cell_with_neighbors(19.4326, -99.1332).unwrap();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains("1943:-9914"));
    }
}
